//! Persisted model artifacts
//!
//! A model directory holds:
//!
//! | file                             | content                                    |
//! |----------------------------------|--------------------------------------------|
//! | `best_model.mpk`                 | weights with the best validation accuracy  |
//! | `plant_disease_model_final.mpk`  | weights at the end of training             |
//! | `class_names.txt`                | class catalog, one name per line           |
//! | `model_meta.json`                | architecture config and the catalog it was trained with |

use std::fs;
use std::path::{Path, PathBuf};

use burn::{module::Module, record::CompactRecorder, tensor::backend::Backend};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::catalog::{ClassCatalog, CATALOG_FILE};
use crate::model::classifier::{PlantClassifier, PlantClassifierConfig};
use crate::utils::error::{PlantError, Result};

/// Stem of the best-checkpoint file
pub const BEST_MODEL: &str = "best_model";
/// Stem of the final-epoch file
pub const FINAL_MODEL: &str = "plant_disease_model_final";
pub const METADATA_FILE: &str = "model_meta.json";
/// Extension the compact recorder appends
pub const MODEL_EXTENSION: &str = "mpk";

/// Error raised whenever the model and the class catalog disagree
pub const MISMATCH_MESSAGE: &str = "Prediction length mismatch with class names.";

/// Path of the weight file for `stem` inside `dir`
pub fn model_file(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}.{}", stem, MODEL_EXTENSION))
}

/// Save weights as `<dir>/<stem>.mpk`, replacing any previous file
pub fn save_model<B: Backend>(model: &PlantClassifier<B>, dir: &Path, stem: &str) -> Result<PathBuf> {
    model
        .clone()
        .save_file(dir.join(stem), &CompactRecorder::new())
        .map_err(|e| PlantError::Model(format!("Failed to save model '{}': {:?}", stem, e)))?;

    Ok(model_file(dir, stem))
}

/// Build a model from `config` and load `<dir>/<stem>.mpk` into it
pub fn load_model<B: Backend>(
    config: &PlantClassifierConfig,
    dir: &Path,
    stem: &str,
    device: &B::Device,
) -> Result<PlantClassifier<B>> {
    let path = model_file(dir, stem);
    if !path.exists() {
        return Err(PlantError::PathNotFound(path));
    }

    config
        .init::<B>(device)
        .load_file(dir.join(stem), &CompactRecorder::new(), device)
        .map_err(|e| PlantError::Model(format!("Failed to load model: {:?}", e)))
}

/// Description of a trained model, written next to its weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub config: PlantClassifierConfig,
    /// The catalog the output layer was trained against, in label order
    pub class_names: Vec<String>,
    pub best_val_accuracy: Option<f64>,
    pub created_at: DateTime<Local>,
    pub version: String,
}

impl ModelMetadata {
    pub fn new(config: PlantClassifierConfig, catalog: &ClassCatalog) -> Self {
        Self {
            config,
            class_names: catalog.names().to_vec(),
            best_val_accuracy: None,
            created_at: Local::now(),
            version: crate::VERSION.to_string(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PlantError::PathNotFound(path.to_path_buf()));
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// Write the catalog side file and metadata into `dir`
pub fn save_descriptors(dir: &Path, metadata: &ModelMetadata, catalog: &ClassCatalog) -> Result<()> {
    fs::create_dir_all(dir)?;
    catalog.save(dir.join(CATALOG_FILE))?;
    metadata.save(&dir.join(METADATA_FILE))
}

/// Read metadata and catalog from `dir` and check they describe the same model
pub fn load_descriptors(dir: &Path) -> Result<(ModelMetadata, ClassCatalog)> {
    let metadata = ModelMetadata::load(&dir.join(METADATA_FILE))?;
    let catalog = ClassCatalog::load(dir.join(CATALOG_FILE))?;

    if metadata.config.num_classes != catalog.len() {
        return Err(PlantError::Config(format!(
            "{} (model has {} outputs, {} lists {} classes)",
            MISMATCH_MESSAGE,
            metadata.config.num_classes,
            CATALOG_FILE,
            catalog.len()
        )));
    }

    if metadata.class_names != catalog.names() {
        return Err(PlantError::Config(format!(
            "{} differs from the catalog the model was trained with",
            CATALOG_FILE
        )));
    }

    info!(
        "Model descriptors: {} classes, {}x{} input, trained {}",
        catalog.len(),
        metadata.config.image_size,
        metadata.config.image_size,
        metadata.created_at.format("%Y-%m-%d %H:%M")
    );

    Ok((metadata, catalog))
}
