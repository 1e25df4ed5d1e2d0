//! # PlantVillage Transfer Learning
//!
//! Plant disease classification from leaf photographs using the Burn framework.
//!
//! ## Features
//!
//! - **Transfer learning**: a frozen ImageNet ResNet-18 trunk with a small trainable head
//! - **Augmented training** with checkpointing, early stopping and learning rate decay
//! - **Evaluation** with per-class precision/recall/F1 and persisted probabilities
//! - **Inference** of single images with remedy text from a generative text API
//!
//! ## Modules
//!
//! - `dataset`: class catalog, image loading, stratified split, augmentation and batching
//! - `model`: ResNet-18 backbone, classification head and persisted artifacts
//! - `training`: the training loop, callbacks and the end-to-end pipeline
//! - `evaluation`: test-set evaluation and reports
//! - `inference`: predictor, remedy lookup and the diagnosis service
//! - `utils`: errors, logging, metrics and charts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plantvillage_tl::backend::{default_device, TrainingBackend};
//! use plantvillage_tl::training::{run_training, TrainingConfig};
//!
//! let report = run_training::<TrainingBackend>(&TrainingConfig::default(), &default_device(), true)?;
//! println!("best val accuracy: {:?}", report.best_val_accuracy);
//! ```

pub mod backend;
pub mod dataset;
pub mod evaluation;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{ClassCatalog, DatasetLoader, ImageSample};
pub use evaluation::{ClassificationReport, Evaluator};
pub use inference::{DiagnosisService, GeminiRemedyClient, PredictionResult, Predictor, RemedySource};
pub use model::{PlantClassifier, PlantClassifierConfig};
pub use training::{run_training, TrainingConfig};
pub use utils::error::{PlantError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Default square input resolution
pub const IMAGE_SIZE: usize = 224;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
