//! Inference: single-image prediction, remedy lookup and the combined service
//!
//! ```text
//! upload bytes -> Predictor (decode, resize, forward, arg-max)
//!              -> remedy_for (healthy short-circuit | RemedySource | fallback)
//!              -> PredictionResult { prediction, confidence, remedy }
//! ```

pub mod predictor;
pub mod remedy;
pub mod service;

pub use predictor::{confidence_percent, Prediction, Predictor, TOP_K};
pub use remedy::{
    remedy_for, remedy_prompt, GeminiRemedyClient, RemedyConfig, RemedySource, FALLBACK_MESSAGE,
    HEALTHY_MESSAGE,
};
pub use service::{DiagnosisService, PredictionResult};
