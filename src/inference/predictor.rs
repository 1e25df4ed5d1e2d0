//! Single-image prediction with a persisted model
//!
//! The predictor owns the best-checkpoint weights and the class catalog they
//! were trained with. It is built once and only read afterwards.

use std::path::Path;
use std::time::Instant;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::catalog::ClassCatalog;
use crate::dataset::loader::rgb_to_chw;
use crate::model::artifact::{load_descriptors, load_model, BEST_MODEL, MISMATCH_MESSAGE};
use crate::model::classifier::PlantClassifier;
use crate::utils::error::{PlantError, Result};
use crate::utils::round_to;

/// Number of alternatives reported alongside the top class
pub const TOP_K: usize = 5;

/// Confidence on the 0..100 scale, rounded to two decimals
pub fn confidence_percent(probability: f32) -> f64 {
    round_to(f64::from(probability) * 100.0, 2).clamp(0.0, 100.0)
}

/// Outcome of one forward pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub class_index: usize,
    pub label: String,
    /// Percentage, two decimals
    pub confidence: f64,
    /// Softmax output in catalog order
    pub probabilities: Vec<f32>,
    /// Best classes first, as (label, percentage)
    pub top_k: Vec<(String, f64)>,
    pub inference_time_ms: f64,
}

/// Loaded model plus its catalog
#[derive(Debug)]
pub struct Predictor<B: Backend> {
    model: PlantClassifier<B>,
    catalog: ClassCatalog,
    image_size: u32,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Pair a model with a catalog, refusing a width mismatch
    pub fn new(
        model: PlantClassifier<B>,
        catalog: ClassCatalog,
        image_size: usize,
        device: B::Device,
    ) -> Result<Self> {
        if model.output_width() != catalog.len() {
            return Err(PlantError::Config(format!(
                "{} (model has {} outputs, catalog has {} classes)",
                MISMATCH_MESSAGE,
                model.output_width(),
                catalog.len()
            )));
        }

        Ok(Self {
            model,
            catalog,
            image_size: image_size as u32,
            device,
        })
    }

    /// Load the best checkpoint and its descriptors from `model_dir`
    pub fn load(model_dir: &Path, device: &B::Device) -> Result<Self> {
        let (metadata, catalog) = load_descriptors(model_dir)?;
        let model = load_model::<B>(&metadata.config, model_dir, BEST_MODEL, device)?;

        info!(
            "Loaded {} from {}",
            BEST_MODEL,
            model_dir.display()
        );

        Self::new(model, catalog, metadata.config.image_size, device.clone())
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn num_classes(&self) -> usize {
        self.catalog.len()
    }

    /// Resize to the training resolution and build a `[1, 3, H, W]` tensor in [0, 1]
    pub fn preprocess(&self, image: &DynamicImage) -> Tensor<B, 4> {
        let size = self.image_size;
        let rgb = image
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();
        let data = TensorData::new(rgb_to_chw(&rgb), [1, 3, size as usize, size as usize]);
        Tensor::from_floats(data, &self.device)
    }

    pub fn predict_image(&self, image: &DynamicImage) -> Result<Prediction> {
        let start = Instant::now();

        let probs = self.model.forward_probs(self.preprocess(image));
        let probabilities: Vec<f32> = probs
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| PlantError::Inference(format!("{:?}", e)))?;

        if probabilities.len() != self.catalog.len() {
            return Err(PlantError::Config(MISMATCH_MESSAGE.to_string()));
        }

        let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let (class_index, probability) = ranked
            .first()
            .copied()
            .ok_or_else(|| PlantError::Inference("empty model output".into()))?;
        let label = self
            .catalog
            .name(class_index)
            .ok_or_else(|| PlantError::Config(MISMATCH_MESSAGE.to_string()))?
            .to_string();

        let top_k = ranked
            .iter()
            .take(TOP_K)
            .filter_map(|&(idx, p)| {
                self.catalog
                    .name(idx)
                    .map(|name| (name.to_string(), confidence_percent(p)))
            })
            .collect();

        let inference_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            "Predicted '{}' ({:.2}%) in {:.1} ms",
            label,
            probability * 100.0,
            inference_time_ms
        );

        Ok(Prediction {
            class_index,
            label,
            confidence: confidence_percent(probability),
            probabilities,
            top_k,
            inference_time_ms,
        })
    }

    /// Decode an uploaded file and predict it
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| PlantError::InvalidInput(format!("Invalid image: {}", e)))?;
        self.predict_image(&image)
    }

    pub fn predict_file(&self, path: &Path) -> Result<Prediction> {
        let image = image::open(path)
            .map_err(|e| PlantError::ImageLoad(path.to_path_buf(), e.to_string()))?;
        self.predict_image(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::artifact::{save_descriptors, save_model, ModelMetadata};
    use crate::model::classifier::PlantClassifierConfig;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    type TestBackend = NdArray;

    fn catalog(n: usize) -> ClassCatalog {
        ClassCatalog::new((0..n).map(|i| format!("Plant___class_{}", i)).collect()).unwrap()
    }

    fn predictor(n: usize) -> Predictor<TestBackend> {
        let device = Default::default();
        let model = PlantClassifierConfig::new(n).init::<TestBackend>(&device);
        Predictor::new(model, catalog(n), 32, device).unwrap()
    }

    #[test]
    fn test_confidence_percent() {
        assert_eq!(confidence_percent(0.98766), 98.77);
        assert_eq!(confidence_percent(1.0), 100.0);
        assert_eq!(confidence_percent(0.0), 0.0);
    }

    #[test]
    fn test_any_input_size_is_resized() {
        let predictor = predictor(3);

        for (w, h) in [(7, 300), (640, 480), (32, 32)] {
            let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([90, 140, 30])));
            assert_eq!(predictor.preprocess(&image).dims(), [1, 3, 32, 32]);

            let prediction = predictor.predict_image(&image).unwrap();
            assert!((0.0..=100.0).contains(&prediction.confidence));
            assert_eq!(
                prediction.confidence,
                (prediction.confidence * 100.0).round() / 100.0
            );
            assert_eq!(prediction.probabilities.len(), 3);
            assert_eq!(prediction.top_k.len(), 3);
            assert_eq!(prediction.top_k[0].0, prediction.label);
        }
    }

    #[test]
    fn test_mismatched_catalog_is_rejected() {
        let device = Default::default();
        let model = PlantClassifierConfig::new(4).init::<TestBackend>(&device);

        let err = Predictor::new(model, catalog(3), 32, device).unwrap_err();
        assert!(err.is_fatal_config());
        assert!(err.to_string().contains(MISMATCH_MESSAGE));
    }

    #[test]
    fn test_predict_bytes() {
        let predictor = predictor(2);

        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 40, Rgb([10, 200, 10])))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        assert!(predictor.predict_bytes(&png).is_ok());

        let err = predictor.predict_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PlantError::InvalidInput(_)));
    }

    #[test]
    fn test_load_from_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = PlantClassifierConfig::new(3).with_image_size(32);
        let model = config.init::<TestBackend>(&device);

        save_model(&model, dir.path(), BEST_MODEL).unwrap();
        save_descriptors(dir.path(), &ModelMetadata::new(config, &catalog(3)), &catalog(3)).unwrap();

        let predictor = Predictor::<TestBackend>::load(dir.path(), &device).unwrap();
        assert_eq!(predictor.num_classes(), 3);
        assert_eq!(predictor.image_size(), 32);
    }

    #[test]
    fn test_load_with_edited_catalog_fails() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = PlantClassifierConfig::new(3).with_image_size(32);
        let model = config.init::<TestBackend>(&device);

        save_model(&model, dir.path(), BEST_MODEL).unwrap();
        save_descriptors(dir.path(), &ModelMetadata::new(config, &catalog(3)), &catalog(3)).unwrap();
        catalog(4)
            .save(dir.path().join(crate::dataset::catalog::CATALOG_FILE))
            .unwrap();

        let err = Predictor::<TestBackend>::load(dir.path(), &device).unwrap_err();
        assert!(err.is_fatal_config());
    }
}
