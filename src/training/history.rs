//! Per-epoch training history and its curve plots

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::charts::{generate_line_chart, DataSeries, YScale, COLOR_TRAIN, COLOR_VALIDATION};
use crate::utils::error::{PlantError, Result};

pub const HISTORY_FILE: &str = "training_history.json";
pub const ACCURACY_PLOT: &str = "training_history_accuracy.svg";
pub const LOSS_PLOT: &str = "training_history_loss.svg";

/// Metrics of one finished epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// One-based epoch number
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    /// Learning rate used during the epoch
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
    /// Set when early stopping ended the run
    pub stopped_early: bool,
    /// One-based epoch whose weights ended up in the best-model file
    pub best_epoch: Option<usize>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.epochs.push(record);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn best_val_accuracy(&self) -> Option<f64> {
        self.epochs
            .iter()
            .map(|e| e.val_accuracy)
            .fold(None, |best, acc| match best {
                Some(b) if b >= acc => Some(b),
                _ => Some(acc),
            })
    }

    fn column(&self, f: impl Fn(&EpochRecord) -> f64) -> Vec<f64> {
        self.epochs.iter().map(f).collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PlantError::PathNotFound(path.to_path_buf()));
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    /// Write the accuracy and loss curves into `dir`, returning both paths
    pub fn plot(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        let to_percent = |v: Vec<f64>| v.into_iter().map(|a| a * 100.0).collect::<Vec<_>>();

        let accuracy_path = dir.join(ACCURACY_PLOT);
        generate_line_chart(
            "Model Accuracy",
            "Epoch",
            "Accuracy (%)",
            &[
                DataSeries::from_epochs(
                    "Training",
                    &to_percent(self.column(|e| e.train_accuracy)),
                    COLOR_TRAIN,
                ),
                DataSeries::from_epochs(
                    "Validation",
                    &to_percent(self.column(|e| e.val_accuracy)),
                    COLOR_VALIDATION,
                ),
            ],
            YScale::Percent,
            &accuracy_path,
        )?;

        let loss_path = dir.join(LOSS_PLOT);
        generate_line_chart(
            "Model Loss",
            "Epoch",
            "Loss",
            &[
                DataSeries::from_epochs("Training", &self.column(|e| e.train_loss), COLOR_TRAIN),
                DataSeries::from_epochs(
                    "Validation",
                    &self.column(|e| e.val_loss),
                    COLOR_VALIDATION,
                ),
            ],
            YScale::Auto,
            &loss_path,
        )?;

        Ok((accuracy_path, loss_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: usize, val_accuracy: f64) -> EpochRecord {
        EpochRecord {
            epoch,
            train_loss: 1.0 / epoch as f64,
            train_accuracy: 0.5,
            val_loss: 0.9 / epoch as f64,
            val_accuracy,
            learning_rate: 0.001,
        }
    }

    #[test]
    fn test_best_val_accuracy() {
        let mut history = TrainingHistory::new();
        assert_eq!(history.best_val_accuracy(), None);

        history.push(record(1, 0.4));
        history.push(record(2, 0.8));
        history.push(record(3, 0.6));
        assert_eq!(history.best_val_accuracy(), Some(0.8));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_save_load_and_plot() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = TrainingHistory::new();
        history.push(record(1, 0.5));
        history.push(record(2, 0.75));
        history.best_epoch = Some(2);

        let path = dir.path().join(HISTORY_FILE);
        history.save(&path).unwrap();
        let loaded = TrainingHistory::load(&path).unwrap();
        assert_eq!(loaded.epochs, history.epochs);
        assert_eq!(loaded.best_epoch, Some(2));

        let (accuracy, loss) = history.plot(dir.path()).unwrap();
        let svg = std::fs::read_to_string(accuracy).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Validation"));
        assert!(loss.exists());
    }
}
