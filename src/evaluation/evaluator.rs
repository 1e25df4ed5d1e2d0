//! Held-out test evaluation
//!
//! Runs a trained classifier over the test folders (no augmentation, a larger
//! per-class cap than training) and persists:
//!
//! - `test_predictions.csv`: one row per image with its class probabilities
//! - `test_report.json`: per-class precision/recall/F1, averages and accuracy
//! - `confusion_matrix.csv`

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    nn::loss::CrossEntropyLossConfig,
    tensor::{backend::Backend, ElementConversion},
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::burn_dataset::{PlantBatch, PlantBatcher, SampleDataset};
use crate::dataset::catalog::ClassCatalog;
use crate::dataset::loader::DatasetLoader;
use crate::model::classifier::PlantClassifier;
use crate::training::config::TrainingConfig;
use crate::utils::error::{PlantError, Result};
use crate::utils::metrics::{Metrics, RunningAverage};

pub const PREDICTIONS_FILE: &str = "test_predictions.csv";
pub const REPORT_FILE: &str = "test_report.json";
pub const CONFUSION_FILE: &str = "confusion_matrix.csv";

/// Model output for one test image
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePrediction {
    pub path: PathBuf,
    pub true_label: usize,
    pub predicted_label: usize,
    /// Softmax output, one entry per class
    pub probabilities: Vec<f32>,
}

/// Summary written to `test_report.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub test_dir: PathBuf,
    /// Mean cross-entropy over the test set
    pub loss: f64,
    pub metrics: Metrics,
    pub evaluated_at: DateTime<Local>,
}

impl ClassificationReport {
    pub fn accuracy(&self) -> f64 {
        self.metrics.accuracy
    }
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    pub image_size: usize,
    pub batch_size: usize,
    pub max_per_class: usize,
    pub show_progress: bool,
}

impl Evaluator {
    pub fn new(image_size: usize, batch_size: usize, max_per_class: usize) -> Self {
        Self {
            image_size,
            batch_size: batch_size.max(1),
            max_per_class,
            show_progress: true,
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new(config.image_size, config.batch_size, config.max_per_class_test)
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Class probabilities for every sample, in dataset order
    pub fn predict<B: Backend>(
        &self,
        model: &PlantClassifier<B>,
        dataset: &SampleDataset,
        device: &B::Device,
    ) -> Result<(Vec<SamplePrediction>, f64)> {
        let batcher = PlantBatcher::new(self.image_size);
        let loss_fn = CrossEntropyLossConfig::new().init(device);
        let num_classes = model.output_width();

        let mut loss = RunningAverage::new();
        let mut predictions = Vec::with_capacity(dataset.len());

        let indices: Vec<usize> = (0..dataset.len()).collect();
        for chunk in indices.chunks(self.batch_size) {
            let items = dataset.gather(chunk);
            let batch: PlantBatch<B> = batcher.batch(items.clone(), device);
            let logits = model.forward(batch.images);

            let batch_loss: f64 = loss_fn
                .forward(logits.clone(), batch.targets)
                .into_scalar()
                .elem();
            loss.add_batch(batch_loss, chunk.len());

            let probs: Vec<f32> = burn::tensor::activation::softmax(logits, 1)
                .into_data()
                .convert::<f32>()
                .to_vec()
                .map_err(|e| PlantError::Inference(format!("{:?}", e)))?;

            if probs.len() != chunk.len() * num_classes {
                return Err(PlantError::Inference(format!(
                    "expected {} probabilities for a batch of {}, got {}",
                    chunk.len() * num_classes,
                    chunk.len(),
                    probs.len()
                )));
            }

            for (item, row) in items.into_iter().zip(probs.chunks(num_classes)) {
                predictions.push(SamplePrediction {
                    true_label: item.label,
                    predicted_label: argmax(row),
                    probabilities: row.to_vec(),
                    path: item.path,
                });
            }
        }

        Ok((predictions, loss.average()))
    }

    /// Metrics for an in-memory test set
    pub fn evaluate<B: Backend>(
        &self,
        model: &PlantClassifier<B>,
        dataset: &SampleDataset,
        catalog: &ClassCatalog,
        device: &B::Device,
    ) -> Result<(Metrics, Vec<SamplePrediction>, f64)> {
        if model.output_width() != catalog.len() {
            return Err(PlantError::Config(
                crate::model::artifact::MISMATCH_MESSAGE.to_string(),
            ));
        }

        let (predictions, loss) = self.predict(model, dataset, device)?;
        let predicted: Vec<usize> = predictions.iter().map(|p| p.predicted_label).collect();
        let truth: Vec<usize> = predictions.iter().map(|p| p.true_label).collect();
        let metrics = Metrics::from_predictions(&predicted, &truth, catalog.names())?;

        Ok((metrics, predictions, loss))
    }

    /// Load `test_dir`, evaluate and write the report files into `output_dir`.
    ///
    /// Returns `Ok(None)` when there is nothing to evaluate.
    pub fn evaluate_dir<B: Backend>(
        &self,
        model: &PlantClassifier<B>,
        test_dir: &Path,
        catalog: &ClassCatalog,
        output_dir: &Path,
        device: &B::Device,
    ) -> Result<Option<ClassificationReport>> {
        if !test_dir.is_dir() {
            info!(
                "No test directory at {}, skipping evaluation",
                test_dir.display()
            );
            return Ok(None);
        }

        let loaded = DatasetLoader::new(self.image_size as u32, self.max_per_class)
            .with_progress(self.show_progress)
            .load(test_dir, catalog)?;

        if loaded.is_empty() {
            warn!(
                "No test images found in {}, skipping evaluation",
                test_dir.display()
            );
            return Ok(None);
        }

        let dataset = SampleDataset::new(loaded.samples);
        let (metrics, predictions, loss) = self.evaluate(model, &dataset, catalog, device)?;

        fs::create_dir_all(output_dir)?;
        save_predictions_csv(&output_dir.join(PREDICTIONS_FILE), &predictions, catalog)?;
        metrics
            .confusion_matrix
            .save_csv(&output_dir.join(CONFUSION_FILE), catalog.names())?;

        let report = ClassificationReport {
            test_dir: test_dir.to_path_buf(),
            loss,
            metrics,
            evaluated_at: Local::now(),
        };
        fs::write(
            output_dir.join(REPORT_FILE),
            serde_json::to_string_pretty(&report)?,
        )?;

        info!(
            "Test accuracy: {:.2}% on {} images (loss {:.4})",
            report.accuracy() * 100.0,
            report.metrics.total_samples,
            loss
        );

        Ok(Some(report))
    }
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_i, best_p), (i, &p)| {
            if p > best_p {
                (i, p)
            } else {
                (best_i, best_p)
            }
        })
        .0
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write `path,true_label,predicted_label,p_<class>...` rows
pub fn save_predictions_csv(
    path: &Path,
    predictions: &[SamplePrediction],
    catalog: &ClassCatalog,
) -> Result<()> {
    let mut csv = String::from("path,true_label,predicted_label");
    for name in catalog.names() {
        csv.push(',');
        csv.push_str(&csv_field(&format!("p_{}", name)));
    }
    csv.push('\n');

    for prediction in predictions {
        let label = |idx: usize| catalog.name(idx).unwrap_or("?").to_string();
        // Writing to a String cannot fail
        let _ = write!(
            csv,
            "{},{},{}",
            csv_field(&prediction.path.to_string_lossy()),
            csv_field(&label(prediction.true_label)),
            csv_field(&label(prediction.predicted_label)),
        );
        for p in &prediction.probabilities {
            let _ = write!(csv, ",{:.6}", p);
        }
        csv.push('\n');
    }

    fs::write(path, csv)?;
    Ok(())
}
