//! Model definitions
//!
//! - [`backbone`]: ResNet-18 trunk used as a frozen feature extractor
//! - [`classifier`]: trainable head and the combined classifier
//! - [`weights`]: download/cache of the ImageNet weights
//! - [`artifact`]: saving and loading trained models with their catalog

pub mod artifact;
pub mod backbone;
pub mod classifier;
pub mod weights;

pub use artifact::{ModelMetadata, BEST_MODEL, FINAL_MODEL, METADATA_FILE};
pub use backbone::ResNetBackbone;
pub use classifier::{ClassificationHead, PlantClassifier, PlantClassifierConfig};
