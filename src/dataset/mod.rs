//! Dataset handling: class catalog, image loading, splitting and batching
//!
//! Data flows through this module as follows:
//! 1. [`ClassCatalog::discover`] reads the sorted class folder names
//! 2. [`DatasetLoader`] decodes and resizes up to N images per class
//! 3. [`split::stratified_split`] holds out a validation fraction per class
//! 4. [`BatchStream`] + [`AugmentingBatcher`] feed perturbed training batches;
//!    [`PlantBatcher`] feeds clean validation/test batches

pub mod augmentation;
pub mod burn_dataset;
pub mod catalog;
pub mod loader;
pub mod split;
pub mod stream;

pub use augmentation::{AugmentationConfig, Augmenter, FillMode};
pub use burn_dataset::{AugmentingBatcher, PlantBatch, PlantBatcher, SampleDataset};
pub use catalog::{is_healthy, ClassCatalog, CATALOG_FILE};
pub use loader::{DatasetLoader, DatasetStats, ImageSample, LoadedImages};
pub use split::{SplitConfig, SplitIndices};
pub use stream::BatchStream;
