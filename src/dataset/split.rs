//! Stratified train/validation split
//!
//! Each class is shuffled independently with a seeded ChaCha8 generator and
//! a fixed fraction of it is moved to the validation set, so class
//! proportions are the same in both halves. The split is reproducible for a
//! given seed.

use std::collections::BTreeMap;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{PlantError, Result};

/// Configuration for the validation split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of every class held out for validation
    pub validation_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn new(validation_fraction: f64, seed: u64) -> Result<Self> {
        if !(0.0..1.0).contains(&validation_fraction) {
            return Err(PlantError::Config(format!(
                "validation fraction must be in [0, 1), got {}",
                validation_fraction
            )));
        }

        Ok(Self {
            validation_fraction,
            seed,
        })
    }
}

/// Indices into the original sample list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Split sample indices by label, keeping class proportions.
///
/// A class with two or more samples always contributes at least one sample to
/// each side; a singleton class stays in training.
pub fn stratified_split(labels: &[usize], config: &SplitConfig) -> SplitIndices {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(idx);
    }

    let mut split = SplitIndices::default();
    for (_, mut indices) in by_class {
        indices.shuffle(&mut rng);

        let n = indices.len();
        let n_val = if n < 2 || config.validation_fraction == 0.0 {
            0
        } else {
            ((n as f64 * config.validation_fraction).round() as usize).clamp(1, n - 1)
        };

        split.validation.extend_from_slice(&indices[..n_val]);
        split.train.extend_from_slice(&indices[n_val..]);
    }

    split
}

/// Partition owned items according to a stratified split of their labels
pub fn split_by_label<T>(
    items: Vec<T>,
    label_of: impl Fn(&T) -> usize,
    config: &SplitConfig,
) -> (Vec<T>, Vec<T>) {
    let labels: Vec<usize> = items.iter().map(&label_of).collect();
    let split = stratified_split(&labels, config);

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let take = |indices: &[usize], slots: &mut Vec<Option<T>>| -> Vec<T> {
        indices.iter().filter_map(|&i| slots[i].take()).collect()
    };

    let train = take(&split.train, &mut slots);
    let validation = take(&split.validation, &mut slots);
    (train, validation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(per_class: &[usize]) -> Vec<usize> {
        per_class
            .iter()
            .enumerate()
            .flat_map(|(label, &n)| std::iter::repeat(label).take(n))
            .collect()
    }

    #[test]
    fn test_split_is_stratified() {
        let labels = labels(&[50, 50, 100]);
        let split = stratified_split(&labels, &SplitConfig::default());

        assert_eq!(split.train.len() + split.validation.len(), 200);
        let val_counts = |c: usize| split.validation.iter().filter(|&&i| labels[i] == c).count();
        assert_eq!(val_counts(0), 10);
        assert_eq!(val_counts(1), 10);
        assert_eq!(val_counts(2), 20);
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let labels = labels(&[7, 13, 3]);
        let split = stratified_split(&labels, &SplitConfig::default());

        let mut all: Vec<usize> = split.train.iter().chain(&split.validation).copied().collect();
        all.sort();
        assert_eq!(all, (0..labels.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_reproducible() {
        let labels = labels(&[30, 30]);
        let config = SplitConfig::default();
        assert_eq!(stratified_split(&labels, &config), stratified_split(&labels, &config));

        let other = SplitConfig::new(0.2, 7).unwrap();
        assert_ne!(stratified_split(&labels, &config), stratified_split(&labels, &other));
    }

    #[test]
    fn test_small_classes() {
        let labels = labels(&[1, 2]);
        let split = stratified_split(&labels, &SplitConfig::default());

        // singleton stays in training, pair is split one/one
        assert!(split.train.contains(&0));
        assert_eq!(split.validation.len(), 1);
        assert_eq!(labels[split.validation[0]], 1);
    }

    #[test]
    fn test_invalid_fraction() {
        assert!(SplitConfig::new(1.0, 42).is_err());
        assert!(SplitConfig::new(-0.1, 42).is_err());
    }

    #[test]
    fn test_split_by_label_moves_items() {
        let items: Vec<(usize, &str)> = (0..10).map(|i| (i % 2, "x")).collect();
        let (train, val) = split_by_label(items, |item| item.0, &SplitConfig::default());
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
    }
}
