//! Pretrained weight download and cache

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::utils::error::{PlantError, Result};

/// A published PyTorch state dict
#[derive(Debug, Clone, Copy)]
pub struct PretrainedWeights {
    pub url: &'static str,
    /// Top-1 ImageNet accuracy reported for these weights
    pub top1: f32,
}

/// torchvision `ResNet18_Weights.IMAGENET1K_V1`
pub const RESNET18_IMAGENET1K_V1: PretrainedWeights = PretrainedWeights {
    url: "https://download.pytorch.org/models/resnet18-f37072fd.pth",
    top1: 69.758,
};

impl PretrainedWeights {
    pub fn file_name(&self) -> &'static str {
        self.url.rsplit('/').next().unwrap_or(self.url)
    }
}

/// `~/.cache/plantvillage_tl`
pub fn cache_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PlantError::Config("cannot determine home directory".to_string()))?;
    Ok(home.join(".cache").join("plantvillage_tl"))
}

/// Path of the cached weight file, downloading it first if needed
pub fn fetch(weights: &PretrainedWeights) -> Result<PathBuf> {
    let dir = cache_dir()?;
    fs::create_dir_all(&dir)?;

    let path = dir.join(weights.file_name());
    if path.exists() {
        return Ok(path);
    }

    info!("Downloading {} ...", weights.url);

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(600))
        .build()
        .map_err(|e| PlantError::Model(format!("Failed to create HTTP client: {e}")))?;

    let bytes = client
        .get(weights.url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .map_err(|e| PlantError::Model(format!("Failed to download {}: {e}", weights.url)))?;

    // Partial downloads never land at the cached path
    let partial = path.with_extension("part");
    let mut file = fs::File::create(&partial)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(&partial, &path)?;

    info!("Saved {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}
