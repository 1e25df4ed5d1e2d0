//! Error Handling Module
//!
//! One error type for the whole pipeline. The variants follow the failure
//! classes the system distinguishes:
//!
//! - configuration problems (`Config`, `PathNotFound`) are fatal and stop
//!   training or server startup,
//! - per-image decode failures (`ImageLoad`) are logged and skipped by the loader,
//! - bad uploads (`InvalidInput`) are reported back to the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the plant disease pipeline
#[derive(Error, Debug)]
pub enum PlantError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with model construction, saving or loading
    #[error("Model error: {0}")]
    Model(String),

    /// Error while training
    #[error("Training error: {0}")]
    Training(String),

    /// Error during a forward pass at inference time
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input supplied by a caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl PlantError {
    /// Whether this error must halt training or server startup
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, PlantError::Config(_) | PlantError::PathNotFound(_))
    }
}

impl From<serde_json::Error> for PlantError {
    fn from(err: serde_json::Error) -> Self {
        PlantError::Serialization(err.to_string())
    }
}

/// Convenience Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PlantError>;
