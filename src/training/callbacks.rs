//! End-of-epoch callbacks
//!
//! Three independent mechanisms run after every validation pass:
//!
//! 1. [`BestCheckpoint`] watches validation accuracy and overwrites the
//!    best-model file on every strict improvement.
//! 2. [`EarlyStopping`] watches validation loss, keeps a copy of the weights
//!    with the lowest loss and asks the loop to stop after `patience`
//!    epochs without improvement.
//! 3. [`ReduceOnPlateauState`](super::scheduler::ReduceOnPlateauState)
//!    watches the same validation loss with its own, shorter patience.

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use tracing::debug;

use crate::model::artifact::{save_model, BEST_MODEL};
use crate::model::classifier::PlantClassifier;
use crate::training::scheduler::PlateauMode;
use crate::utils::error::Result;

/// Keeps the single best-accuracy artifact of a run on disk
#[derive(Debug, Clone)]
pub struct BestCheckpoint {
    dir: PathBuf,
    best: f64,
    best_epoch: Option<usize>,
    saves: usize,
}

impl BestCheckpoint {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            best: PlateauMode::Max.worst(),
            best_epoch: None,
            saves: 0,
        }
    }

    /// Save `model` if `val_accuracy` beats every earlier epoch.
    ///
    /// Returns `true` when the file was written. Ties keep the earlier epoch.
    pub fn update<B: Backend>(
        &mut self,
        epoch: usize,
        val_accuracy: f64,
        model: &PlantClassifier<B>,
    ) -> Result<bool> {
        if !PlateauMode::Max.improves(val_accuracy, self.best) {
            debug!(
                "val_accuracy {:.4} did not improve on {:.4}",
                val_accuracy, self.best
            );
            return Ok(false);
        }

        save_model(model, &self.dir, BEST_MODEL)?;
        self.best = val_accuracy;
        self.best_epoch = Some(epoch);
        self.saves += 1;
        Ok(true)
    }

    /// Best validation accuracy so far, `None` before the first epoch
    pub fn best(&self) -> Option<f64> {
        self.best_epoch.map(|_| self.best)
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// How many times the artifact was overwritten
    pub fn saves(&self) -> usize {
        self.saves
    }
}

/// What [`EarlyStopping::update`] decided for the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    Continue,
    Stop,
}

/// Patience-based stop on validation loss with best-weight restore
#[derive(Debug, Clone)]
pub struct EarlyStopping<M> {
    patience: usize,
    best: f64,
    best_epoch: usize,
    wait: usize,
    snapshot: Option<M>,
}

impl<M: Clone> EarlyStopping<M> {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: PlateauMode::Min.worst(),
            best_epoch: 0,
            wait: 0,
            snapshot: None,
        }
    }

    pub fn update(&mut self, epoch: usize, val_loss: f64, model: &M) -> StopDecision {
        if PlateauMode::Min.improves(val_loss, self.best) {
            self.best = val_loss;
            self.best_epoch = epoch;
            self.wait = 0;
            self.snapshot = Some(model.clone());
            return StopDecision::Continue;
        }

        self.wait += 1;
        debug!(
            "val_loss {:.4} did not improve on {:.4} ({}/{})",
            val_loss, self.best, self.wait, self.patience
        );

        if self.wait >= self.patience {
            StopDecision::Stop
        } else {
            StopDecision::Continue
        }
    }

    /// Weights from the lowest-loss epoch, consuming the snapshot
    pub fn take_best(&mut self) -> Option<M> {
        self.snapshot.take()
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    pub fn patience(&self) -> usize {
        self.patience
    }
}
