//! Training run configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::dataset::split::SplitConfig;
use crate::model::classifier::PlantClassifierConfig;
use crate::utils::error::{PlantError, Result};

/// Everything a training run needs, serialisable to JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Root of the per-class training folders
    pub train_dir: PathBuf,

    /// Root of the per-class test folders (evaluation is skipped if absent)
    pub test_dir: PathBuf,

    /// Where weights, catalog, history and reports are written
    pub model_dir: PathBuf,

    /// Square input resolution
    pub image_size: usize,

    pub batch_size: usize,

    /// Maximum number of epochs
    pub epochs: usize,

    /// Initial Adam learning rate
    pub learning_rate: f64,

    /// Per-class cap when loading the training folders
    pub max_per_class_train: usize,

    /// Per-class cap when loading the test folders
    pub max_per_class_test: usize,

    /// Fraction of every class held out for validation
    pub validation_split: f64,

    /// Random seed for split, shuffling and augmentation
    pub seed: u64,

    /// Epochs without validation-loss improvement before stopping
    pub early_stopping_patience: usize,

    /// Epochs without validation-loss improvement before the LR is reduced
    pub lr_patience: usize,

    /// Multiplier applied on every LR reduction
    pub lr_factor: f64,

    /// Lower bound for the learning rate
    pub min_lr: f64,

    /// Start from ImageNet weights instead of a random trunk
    pub pretrained: bool,

    pub hidden_units: usize,

    pub dropout: f64,

    pub augmentation: AugmentationConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            train_dir: PathBuf::from("data_split/train"),
            test_dir: PathBuf::from("data_split/test"),
            model_dir: PathBuf::from("model"),
            image_size: crate::IMAGE_SIZE,
            batch_size: 16,
            epochs: 8,
            learning_rate: 0.001,
            max_per_class_train: 300,
            max_per_class_test: 100,
            validation_split: 0.2,
            seed: 42,
            early_stopping_patience: 3,
            lr_patience: 2,
            lr_factor: 0.5,
            min_lr: 1e-6,
            pretrained: true,
            hidden_units: 64,
            dropout: 0.3,
            augmentation: AugmentationConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Check value ranges before any work is done
    pub fn validate(&self) -> Result<()> {
        if self.image_size == 0 {
            return Err(PlantError::Config("image_size must be greater than 0".into()));
        }

        if self.batch_size == 0 {
            return Err(PlantError::Config("batch_size must be greater than 0".into()));
        }

        if self.epochs == 0 {
            return Err(PlantError::Config("epochs must be greater than 0".into()));
        }

        if self.learning_rate <= 0.0 {
            return Err(PlantError::Config("learning_rate must be positive".into()));
        }

        if self.max_per_class_train == 0 {
            return Err(PlantError::Config(
                "max_per_class_train must be greater than 0".into(),
            ));
        }

        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err(PlantError::Config(
                "validation_split must be in range (0.0, 1.0)".into(),
            ));
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(PlantError::Config("dropout must be in range [0.0, 1.0)".into()));
        }

        if !(self.lr_factor > 0.0 && self.lr_factor < 1.0) {
            return Err(PlantError::Config("lr_factor must be in range (0.0, 1.0)".into()));
        }

        if self.min_lr < 0.0 || self.min_lr > self.learning_rate {
            return Err(PlantError::Config(
                "min_lr must be in range [0.0, learning_rate]".into(),
            ));
        }

        Ok(())
    }

    pub fn split(&self) -> Result<SplitConfig> {
        SplitConfig::new(self.validation_split, self.seed)
    }

    /// Architecture config for a catalog of `num_classes`
    pub fn model_config(&self, num_classes: usize) -> PlantClassifierConfig {
        PlantClassifierConfig::new(num_classes)
            .with_hidden_units(self.hidden_units)
            .with_dropout(self.dropout)
            .with_image_size(self.image_size)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PlantError::PathNotFound(path.to_path_buf()));
        }
        let config: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }
}
