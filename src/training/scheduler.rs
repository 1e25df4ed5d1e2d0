//! Learning rate reduction on a validation plateau

use serde::{Deserialize, Serialize};

/// Whether the monitored metric should go down or up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlateauMode {
    /// Metric should decrease (e.g., loss)
    Min,
    /// Metric should increase (e.g., accuracy)
    Max,
}

impl PlateauMode {
    /// Starting value every real metric improves on
    pub fn worst(&self) -> f64 {
        match self {
            Self::Min => f64::INFINITY,
            Self::Max => f64::NEG_INFINITY,
        }
    }

    /// Strict improvement test
    pub fn improves(&self, metric: f64, best: f64) -> bool {
        match self {
            Self::Min => metric < best,
            Self::Max => metric > best,
        }
    }
}

/// Multiplies the learning rate by `reduction_factor` after `patience`
/// epochs without improvement, never going below `min_lr`
#[derive(Debug, Clone)]
pub struct ReduceOnPlateauState {
    best_metric: f64,
    epochs_without_improvement: usize,
    current_lr: f64,
    reduction_factor: f64,
    patience: usize,
    min_lr: f64,
    mode: PlateauMode,
}

impl ReduceOnPlateauState {
    pub fn new(
        initial_lr: f64,
        reduction_factor: f64,
        patience: usize,
        min_lr: f64,
        mode: PlateauMode,
    ) -> Self {
        Self {
            best_metric: mode.worst(),
            epochs_without_improvement: 0,
            current_lr: initial_lr,
            reduction_factor,
            patience,
            min_lr,
            mode,
        }
    }

    /// Feed one epoch's metric and return the learning rate for the next epoch
    pub fn step(&mut self, metric: f64) -> f64 {
        if self.mode.improves(metric, self.best_metric) {
            self.best_metric = metric;
            self.epochs_without_improvement = 0;
            return self.current_lr;
        }

        self.epochs_without_improvement += 1;

        if self.epochs_without_improvement >= self.patience {
            let new_lr = (self.current_lr * self.reduction_factor).max(self.min_lr);
            if new_lr < self.current_lr {
                self.current_lr = new_lr;
                self.epochs_without_improvement = 0;
            }
        }

        self.current_lr
    }

    pub fn get_lr(&self) -> f64 {
        self.current_lr
    }

    pub fn best_metric(&self) -> f64 {
        self.best_metric
    }
}
