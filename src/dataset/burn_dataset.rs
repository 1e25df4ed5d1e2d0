//! Burn dataset and batchers
//!
//! - `SampleDataset`: in-memory samples behind Burn's `Dataset` trait
//! - `PlantBatcher`: stacks samples into `[B, 3, H, W]` tensors in [0, 1]
//! - `AugmentingBatcher`: same, with a random perturbation per sample (training only)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::dataset::augmentation::{AugmentationConfig, Augmenter};
use crate::dataset::loader::{rgb_to_chw, ImageSample};

/// In-memory dataset of decoded samples
#[derive(Debug, Clone, Default)]
pub struct SampleDataset {
    samples: Vec<ImageSample>,
}

impl SampleDataset {
    pub fn new(samples: Vec<ImageSample>) -> Self {
        Self { samples }
    }

    /// Clone the samples at the given indices
    pub fn gather(&self, indices: &[usize]) -> Vec<ImageSample> {
        indices
            .iter()
            .filter_map(|&i| self.samples.get(i).cloned())
            .collect()
    }
}

impl Dataset<ImageSample> for SampleDataset {
    fn get(&self, index: usize) -> Option<ImageSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images and integer targets
#[derive(Clone, Debug)]
pub struct PlantBatch<B: Backend> {
    /// `[batch, 3, height, width]`, values in [0, 1]
    pub images: Tensor<B, 4>,
    /// `[batch]` label indices
    pub targets: Tensor<B, 1, Int>,
}

/// Stack CHW float buffers and labels into a batch
fn stack<B: Backend>(
    images_data: Vec<f32>,
    targets_data: Vec<i64>,
    image_size: usize,
    device: &B::Device,
) -> PlantBatch<B> {
    let batch_size = targets_data.len();

    let images = Tensor::<B, 4>::from_floats(
        TensorData::new(images_data, [batch_size, 3, image_size, image_size]),
        device,
    );
    let targets =
        Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

    PlantBatch { images, targets }
}

/// Pixels of a sample at exactly `size x size`
fn sample_pixels(sample: &ImageSample, size: u32) -> Vec<f32> {
    if sample.image.dimensions() == (size, size) {
        sample.to_tensor_data()
    } else {
        let resized = image::imageops::resize(&sample.image, size, size, FilterType::Triangle);
        rgb_to_chw(&resized)
    }
}

/// Plain batcher for validation, test and inference
#[derive(Clone, Debug)]
pub struct PlantBatcher {
    image_size: usize,
}

impl PlantBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, ImageSample, PlantBatch<B>> for PlantBatcher {
    fn batch(&self, items: Vec<ImageSample>, device: &B::Device) -> PlantBatch<B> {
        let size = self.image_size as u32;

        let images_data: Vec<f32> = items
            .par_iter()
            .flat_map_iter(|item| sample_pixels(item, size))
            .collect();
        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();

        stack(images_data, targets_data, self.image_size, device)
    }
}

/// Batcher that perturbs every sample before stacking
///
/// Each batch gets its own seed derived from the base seed and a batch
/// counter; each sample then gets an independent generator drawn from it.
/// Runs are reproducible for a fixed base seed.
#[derive(Clone, Debug)]
pub struct AugmentingBatcher {
    image_size: usize,
    augmenter: Augmenter,
    seed: u64,
    batches_drawn: Arc<AtomicU64>,
}

impl AugmentingBatcher {
    pub fn new(image_size: usize, config: AugmentationConfig, seed: u64) -> Self {
        Self {
            image_size,
            augmenter: Augmenter::new(config),
            seed,
            batches_drawn: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<B: Backend> Batcher<B, ImageSample, PlantBatch<B>> for AugmentingBatcher {
    fn batch(&self, items: Vec<ImageSample>, device: &B::Device) -> PlantBatch<B> {
        let size = self.image_size as u32;
        let batch_index = self.batches_drawn.fetch_add(1, Ordering::SeqCst);
        let mut batch_rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(batch_index));
        let seeds: Vec<u64> = items.iter().map(|_| batch_rng.gen()).collect();

        let images_data: Vec<f32> = items
            .par_iter()
            .zip(seeds)
            .flat_map_iter(|(item, seed)| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let augmented = ImageSample {
                    path: item.path.clone(),
                    label: item.label,
                    image: self.augmenter.augment(&item.image, &mut rng),
                };
                sample_pixels(&augmented, size)
            })
            .collect();
        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();

        stack(images_data, targets_data, self.image_size, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    type TestBackend = NdArray;

    fn sample(label: usize, value: u8, size: u32) -> ImageSample {
        ImageSample {
            path: PathBuf::from(format!("{}.png", value)),
            label,
            image: RgbImage::from_pixel(size, size, Rgb([value, value, value])),
        }
    }

    #[test]
    fn test_dataset_len_and_get() {
        let dataset = SampleDataset::new(vec![sample(0, 0, 4), sample(1, 255, 4)]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(1).unwrap().label, 1);
        assert!(dataset.get(2).is_none());
        assert_eq!(dataset.gather(&[1, 0]).len(), 2);
    }

    #[test]
    fn test_plain_batch_shape_and_range() {
        let device = Default::default();
        let batcher = PlantBatcher::new(8);
        let batch: PlantBatch<TestBackend> =
            batcher.batch(vec![sample(0, 0, 8), sample(1, 255, 8), sample(1, 51, 12)], &device);

        assert_eq!(batch.images.dims(), [3, 3, 8, 8]);
        assert_eq!(batch.targets.dims(), [3]);

        let max: f32 = batch.images.clone().max().into_scalar();
        let min: f32 = batch.images.min().into_scalar();
        assert!((max - 1.0).abs() < 1e-6);
        assert_eq!(min, 0.0);

        let targets: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![0, 1, 1]);
    }

    #[test]
    fn test_augmenting_batch_is_reproducible() {
        let device = Default::default();
        let items: Vec<ImageSample> = (0..4)
            .map(|i| ImageSample {
                path: PathBuf::new(),
                label: i % 2,
                image: RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, 0])),
            })
            .collect();

        let a = AugmentingBatcher::new(16, AugmentationConfig::default(), 42);
        let b = AugmentingBatcher::new(16, AugmentationConfig::default(), 42);

        let batch_a: PlantBatch<TestBackend> = a.batch(items.clone(), &device);
        let batch_b: PlantBatch<TestBackend> = b.batch(items.clone(), &device);
        let data_a: Vec<f32> = batch_a.images.into_data().to_vec().unwrap();
        let data_b: Vec<f32> = batch_b.images.into_data().to_vec().unwrap();
        assert_eq!(data_a, data_b);

        // Next batch from the same batcher uses a fresh seed
        let batch_a2: PlantBatch<TestBackend> = a.batch(items, &device);
        let data_a2: Vec<f32> = batch_a2.images.into_data().to_vec().unwrap();
        assert_ne!(data_a, data_a2);
    }
}
