//! Class catalog
//!
//! The ordered list of class names that gives each output unit of the
//! classifier its meaning. It is discovered once from the training folder,
//! written next to the model, and read back verbatim by the inference side.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::utils::error::{PlantError, Result};

/// File name of the plain-text catalog inside the model directory
pub const CATALOG_FILE: &str = "class_names.txt";

/// Ordered class names, index = label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCatalog {
    names: Vec<String>,
}

impl ClassCatalog {
    /// Build from an explicit list. An empty list is a configuration error.
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(PlantError::Config("class catalog is empty".to_string()));
        }
        Ok(Self { names })
    }

    /// Discover classes as the sorted subdirectory names of `root`
    pub fn discover<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(PlantError::PathNotFound(root.to_path_buf()));
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                match entry.file_name().to_str() {
                    Some(name) => names.push(name.to_string()),
                    None => warn!(
                        "Skipping class folder with a non UTF-8 name: {}",
                        entry.path().display()
                    ),
                }
            }
        }
        names.sort();

        if names.is_empty() {
            return Err(PlantError::Config(format!(
                "no class folders found in {}",
                root.display()
            )));
        }

        info!("Found {} classes in {}", names.len(), root.display());
        Ok(Self { names })
    }

    /// Write one name per line, in label order
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.names.join("\n"))?;
        Ok(())
    }

    /// Read a catalog written by [`ClassCatalog::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PlantError::PathNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let mut names: Vec<String> = content.split('\n').map(|l| l.trim_end_matches('\r').to_string()).collect();
        if names.last().is_some_and(|l| l.is_empty()) {
            names.pop();
        }

        Self::new(names)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Whether a class label denotes a healthy plant (case-insensitive)
pub fn is_healthy(class_name: &str) -> bool {
    class_name.to_lowercase().contains("healthy")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_sorts_folders_and_ignores_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Tomato___healthy", "Apple___Black_rot", "Corn___Common_rust"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("README.txt"), "not a class").unwrap();

        let catalog = ClassCatalog::discover(dir.path()).unwrap();
        assert_eq!(
            catalog.names(),
            &["Apple___Black_rot", "Corn___Common_rust", "Tomato___healthy"]
        );
        assert_eq!(catalog.index_of("Tomato___healthy"), Some(2));
    }

    #[test]
    fn test_discover_missing_root_is_fatal() {
        let err = ClassCatalog::discover("/definitely/not/here").unwrap_err();
        assert!(err.is_fatal_config());
    }

    #[test]
    fn test_discover_empty_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClassCatalog::discover(dir.path()).unwrap_err();
        assert!(matches!(err, PlantError::Config(_)));
    }

    #[test]
    fn test_save_load_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CATALOG_FILE);
        let catalog =
            ClassCatalog::new(vec!["diseased".into(), "healthy".into(), "Zebra_mosaic".into()])
                .unwrap();

        catalog.save(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "diseased\nhealthy\nZebra_mosaic");
        assert_eq!(ClassCatalog::load(&path).unwrap(), catalog);
    }

    #[test]
    fn test_load_tolerates_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CATALOG_FILE);
        fs::write(&path, "a\nb\n").unwrap();
        assert_eq!(ClassCatalog::load(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_is_healthy() {
        assert!(is_healthy("Tomato___healthy"));
        assert!(is_healthy("HEALTHY"));
        assert!(is_healthy("Healthy_leaf"));
        assert!(!is_healthy("Potato___Late_blight"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_folder_is_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Tomato___healthy")).unwrap();
        fs::create_dir(dir.path().join(OsStr::from_bytes(b"bad\xffname"))).unwrap();

        let catalog = ClassCatalog::discover(dir.path()).unwrap();
        assert_eq!(catalog.names(), ["Tomato___healthy"]);
    }
}
