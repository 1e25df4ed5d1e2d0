//! Prediction plus remedy, the unit served per request

use std::path::Path;
use std::sync::{Arc, Mutex};

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::inference::predictor::{Prediction, Predictor};
use crate::inference::remedy::{remedy_for, RemedySource};
use crate::utils::error::{PlantError, Result};

/// Response body of a successful diagnosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: String,
    /// Percentage with two decimals
    pub confidence: f64,
    pub remedy: String,
}

/// Model, catalog and remedy source for the request path.
///
/// Forward passes are serialized on the predictor lock; remedy lookups run
/// outside it. Share the service behind an `Arc`.
pub struct DiagnosisService<B: Backend> {
    predictor: Mutex<Predictor<B>>,
    num_classes: usize,
    remedies: Arc<dyn RemedySource>,
}

impl<B: Backend> DiagnosisService<B> {
    pub fn new(predictor: Predictor<B>, remedies: Arc<dyn RemedySource>) -> Self {
        Self {
            num_classes: predictor.num_classes(),
            predictor: Mutex::new(predictor),
            remedies,
        }
    }

    /// Load the best model from `model_dir`
    pub fn load(
        model_dir: &Path,
        device: &B::Device,
        remedies: Arc<dyn RemedySource>,
    ) -> Result<Self> {
        Ok(Self::new(Predictor::load(model_dir, device)?, remedies))
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Classify uploaded bytes without a remedy lookup
    pub fn predict(&self, bytes: &[u8]) -> Result<Prediction> {
        let predictor = self
            .predictor
            .lock()
            .map_err(|_| PlantError::Inference("predictor lock poisoned".into()))?;
        predictor.predict_bytes(bytes)
    }

    /// Remedy text for an existing prediction
    pub fn remedy(&self, prediction: &Prediction) -> String {
        remedy_for(&prediction.label, self.remedies.as_ref())
    }

    /// Decode, classify and look up a remedy for one uploaded image.
    ///
    /// Blocks on the remedy call for non-healthy classes.
    pub fn diagnose(&self, bytes: &[u8]) -> Result<PredictionResult> {
        let prediction = self.predict(bytes)?;
        let remedy = self.remedy(&prediction);

        Ok(PredictionResult {
            prediction: prediction.label,
            confidence: prediction.confidence,
            remedy,
        })
    }
}
