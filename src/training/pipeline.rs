//! End-to-end training run
//!
//! discover catalog -> load images -> stratified split -> fit head
//! -> persist final model, descriptors and history -> evaluate on the test set

use std::path::{Path, PathBuf};

use burn::{data::dataset::Dataset, module::AutodiffModule, tensor::backend::AutodiffBackend};
use tracing::{info, warn};

use crate::dataset::burn_dataset::SampleDataset;
use crate::dataset::catalog::ClassCatalog;
use crate::dataset::loader::DatasetLoader;
use crate::dataset::split::split_by_label;
use crate::evaluation::{ClassificationReport, Evaluator};
use crate::model::artifact::{model_file, save_descriptors, save_model, ModelMetadata, BEST_MODEL, FINAL_MODEL};
use crate::training::config::TrainingConfig;
use crate::training::history::{TrainingHistory, HISTORY_FILE};
use crate::training::trainer::Trainer;
use crate::utils::error::{PlantError, Result};

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub catalog: ClassCatalog,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub skipped_files: usize,
    pub history: TrainingHistory,
    pub best_val_accuracy: Option<f64>,
    pub best_model: PathBuf,
    pub final_model: PathBuf,
    /// `None` when evaluation was skipped
    pub test_report: Option<ClassificationReport>,
}

/// Train, persist and evaluate according to `config`.
///
/// Fails before any training work when the training folder is missing,
/// has no classes, or yields no images.
pub fn run_training<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: &B::Device,
    show_progress: bool,
) -> Result<PipelineReport> {
    config.validate()?;

    if !config.train_dir.is_dir() {
        return Err(PlantError::PathNotFound(config.train_dir.clone()));
    }

    let catalog = ClassCatalog::discover(&config.train_dir)?;

    let loaded = DatasetLoader::new(config.image_size as u32, config.max_per_class_train)
        .with_progress(show_progress)
        .load(&config.train_dir, &catalog)?;

    if loaded.is_empty() {
        return Err(PlantError::Config(format!(
            "no training images could be loaded from {}",
            config.train_dir.display()
        )));
    }

    for (name, count) in catalog.names().iter().zip(&loaded.class_counts) {
        if *count == 0 {
            warn!("Class '{}' has no training images", name);
        }
    }

    let skipped_files = loaded.skipped.len();
    let (train, valid) = split_by_label(loaded.samples, |s| s.label, &config.split()?);
    if train.is_empty() {
        return Err(PlantError::Config("training split is empty".into()));
    }

    let train = SampleDataset::new(train);
    let valid = SampleDataset::new(valid);
    info!(
        "Split: {} training / {} validation samples",
        train.len(),
        valid.len()
    );

    // Descriptors go down before any weights so a checkpoint never sits next
    // to another run's catalog
    let model_config = config.model_config(catalog.len());
    remove_stale_weights(&config.model_dir)?;
    let mut metadata = ModelMetadata::new(model_config.clone(), &catalog);
    save_descriptors(&config.model_dir, &metadata, &catalog)?;

    let model = if config.pretrained {
        model_config.init_pretrained::<B>(device)?
    } else {
        model_config.init::<B>(device)
    };

    let outcome = Trainer::new(model, config.clone(), device.clone()).fit(&train, &valid)?;

    let final_model = save_model(&outcome.model, &config.model_dir, FINAL_MODEL)?;
    info!("Final model saved to {}", final_model.display());

    metadata.best_val_accuracy = outcome.best_val_accuracy;
    save_descriptors(&config.model_dir, &metadata, &catalog)?;

    outcome
        .history
        .save(&config.model_dir.join(HISTORY_FILE))?;
    match outcome.history.plot(&config.model_dir) {
        Ok((accuracy, loss)) => info!(
            "Training curves written to {} and {}",
            accuracy.display(),
            loss.display()
        ),
        Err(e) => warn!("Could not write training curves: {}", e),
    }

    let test_report = Evaluator::from_config(config)
        .with_progress(show_progress)
        .evaluate_dir(
            &outcome.model.valid(),
            &config.test_dir,
            &catalog,
            &config.model_dir,
            device,
        )?;

    Ok(PipelineReport {
        catalog,
        train_samples: train.len(),
        validation_samples: valid.len(),
        skipped_files,
        history: outcome.history,
        best_val_accuracy: outcome.best_val_accuracy,
        best_model: model_file(&config.model_dir, BEST_MODEL),
        final_model,
        test_report,
    })
}

/// Delete weight files a previous run left in `model_dir`
fn remove_stale_weights(model_dir: &Path) -> Result<()> {
    for stem in [BEST_MODEL, FINAL_MODEL] {
        let path = model_file(model_dir, stem);
        if path.is_file() {
            warn!("Removing weights of a previous run: {}", path.display());
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
