//! Image folder loader
//!
//! Reads a `<root>/<class_name>/<image files>` tree into memory. Every image
//! is decoded, converted to RGB and resized to a fixed square resolution.
//! At most `max_per_class` images are kept per class.
//!
//! Bad files never abort a load: undecodable images are logged and skipped,
//! and a class folder that does not exist simply contributes no samples.

use std::path::{Path, PathBuf};

use image::{imageops::FilterType, ImageReader, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::dataset::catalog::ClassCatalog;
use crate::utils::error::{PlantError, Result};

/// File extensions recognised as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// A decoded, resized image with its class label
#[derive(Debug, Clone)]
pub struct ImageSample {
    /// Source file
    pub path: PathBuf,
    /// Label index into the class catalog
    pub label: usize,
    /// RGB pixels at the loader's resolution
    pub image: RgbImage,
}

impl ImageSample {
    /// Pixels as CHW floats normalised to [0, 1]
    pub fn to_tensor_data(&self) -> Vec<f32> {
        rgb_to_chw(&self.image)
    }
}

/// Convert an RGB image into CHW layout with values in [0, 1]
pub fn rgb_to_chw(image: &RgbImage) -> Vec<f32> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let plane = width * height;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in image.enumerate_pixels() {
        let idx = y as usize * width + x as usize;
        data[idx] = pixel[0] as f32 / 255.0;
        data[plane + idx] = pixel[1] as f32 / 255.0;
        data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    data
}

/// Decode an image file and resize it to `size x size`
pub fn load_rgb(path: &Path, size: u32) -> Result<RgbImage> {
    let img = ImageReader::open(path)
        .map_err(|e| PlantError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| PlantError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| PlantError::ImageLoad(path.to_path_buf(), e.to_string()))?;

    Ok(img.resize_exact(size, size, FilterType::Triangle).to_rgb8())
}

/// Whether a path has one of the recognised image extensions
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by path
pub fn list_image_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_image_file(p))
        .collect();
    files.sort();
    files
}

/// Result of loading one dataset split
#[derive(Debug, Clone, Default)]
pub struct LoadedImages {
    /// Samples in class order
    pub samples: Vec<ImageSample>,
    /// Number of samples kept per class, indexed by label
    pub class_counts: Vec<usize>,
    /// Files that could not be decoded
    pub skipped: Vec<PathBuf>,
}

impl LoadedImages {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Label of every sample, parallel to `samples`
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }
}

/// Loads image folders with a per-class cap
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    /// Output side length in pixels
    pub image_size: u32,
    /// Maximum number of decoded images kept per class
    pub max_per_class: usize,
    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

impl DatasetLoader {
    pub fn new(image_size: u32, max_per_class: usize) -> Self {
        Self {
            image_size,
            max_per_class,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Load every class of `catalog` from `root`
    pub fn load<P: AsRef<Path>>(&self, root: P, catalog: &ClassCatalog) -> Result<LoadedImages> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(PlantError::PathNotFound(root.to_path_buf()));
        }

        info!(
            "Loading images from {} (max {} per class, {}x{})",
            root.display(),
            self.max_per_class,
            self.image_size,
            self.image_size
        );

        let pb = if self.show_progress {
            let pb = ProgressBar::new(catalog.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut loaded = LoadedImages {
            class_counts: vec![0; catalog.len()],
            ..LoadedImages::default()
        };

        for (label, class_name) in catalog.names().iter().enumerate() {
            pb.set_message(class_name.clone());
            let class_dir = root.join(class_name);

            if !class_dir.is_dir() {
                warn!("Missing class folder: {}", class_dir.display());
                pb.inc(1);
                continue;
            }

            let files = list_image_files(&class_dir);
            let (samples, skipped) = self.load_class(&files, label);

            debug!(
                "Class '{}' (label {}): {} loaded, {} skipped, {} files",
                class_name,
                label,
                samples.len(),
                skipped.len(),
                files.len()
            );

            loaded.class_counts[label] = samples.len();
            loaded.samples.extend(samples);
            loaded.skipped.extend(skipped);
            pb.inc(1);
        }

        pb.finish_and_clear();

        info!(
            "Loaded {} images across {} classes ({} skipped)",
            loaded.len(),
            catalog.len(),
            loaded.skipped.len()
        );

        Ok(loaded)
    }

    /// Decode files in order until the cap is reached.
    ///
    /// Decoding runs in parallel chunks sized to the remaining quota, so a
    /// failed file is replaced by the next one in the listing.
    fn load_class(&self, files: &[PathBuf], label: usize) -> (Vec<ImageSample>, Vec<PathBuf>) {
        let mut samples = Vec::new();
        let mut skipped = Vec::new();
        let mut remaining = files;

        while samples.len() < self.max_per_class && !remaining.is_empty() {
            let want = (self.max_per_class - samples.len()).min(remaining.len());
            let (chunk, rest) = remaining.split_at(want);
            remaining = rest;

            let decoded: Vec<(PathBuf, Result<RgbImage>)> = chunk
                .par_iter()
                .map(|path| (path.clone(), load_rgb(path, self.image_size)))
                .collect();

            for (path, result) in decoded {
                match result {
                    Ok(image) => samples.push(ImageSample { path, label, image }),
                    Err(e) => {
                        warn!("Skipping {}: {}", path.display(), e);
                        skipped.push(path);
                    }
                }
            }
        }

        (samples, skipped)
    }
}

/// File counts per class, without decoding anything
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub class_names: Vec<String>,
    pub class_counts: Vec<usize>,
}

impl DatasetStats {
    /// Count image files for every catalog class under `root`
    pub fn scan<P: AsRef<Path>>(root: P, catalog: &ClassCatalog) -> Self {
        let root = root.as_ref();
        let class_counts: Vec<usize> = catalog
            .names()
            .iter()
            .map(|name| list_image_files(&root.join(name)).len())
            .collect();

        Self {
            total_samples: class_counts.iter().sum(),
            class_names: catalog.names().to_vec(),
            class_counts,
        }
    }

    /// Print statistics to console
    pub fn print(&self) {
        println!("\n📊 Dataset Statistics:");
        println!("  Total samples: {}", crate::utils::format_number(self.total_samples));
        println!("  Number of classes: {}", self.class_names.len());
        println!("\n  Samples per class:");

        let max = self.class_counts.iter().copied().max().unwrap_or(0).max(1);
        for (idx, (name, count)) in self.class_names.iter().zip(&self.class_counts).enumerate() {
            let bar = "█".repeat(count * 40 / max);
            println!("    {:3}. {:45} {:6} {}", idx, name, count, bar);
        }
    }
}
