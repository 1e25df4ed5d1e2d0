//! Training module for the transfer-learning classifier
//!
//! This module provides:
//! - [`TrainingConfig`]: run parameters with JSON load/save
//! - [`Trainer`]: the epoch loop over augmented batches, head-only updates
//! - [`callbacks`]: best checkpoint and early stopping
//! - [`scheduler`]: learning rate reduction on a validation-loss plateau
//! - [`history`]: per-epoch metrics and their curve plots
//! - [`run_training`]: the whole pipeline from folders to evaluated model

pub mod callbacks;
pub mod config;
pub mod history;
pub mod pipeline;
pub mod scheduler;
pub mod trainer;

pub use callbacks::{BestCheckpoint, EarlyStopping, StopDecision};
pub use config::TrainingConfig;
pub use history::{EpochRecord, TrainingHistory};
pub use pipeline::{run_training, PipelineReport};
pub use scheduler::{PlateauMode, ReduceOnPlateauState};
pub use trainer::{TrainOutcome, Trainer};
