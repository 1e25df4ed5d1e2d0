//! Classification metrics
//!
//! Precision, recall and F1 per class, macro and support-weighted averages,
//! overall accuracy and a confusion matrix. Rendered as a text report in the
//! same layout scikit-learn's `classification_report` uses.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::{PlantError, Result};

/// Evaluation metrics over a labelled prediction set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of samples evaluated
    pub total_samples: usize,

    /// Number of correct predictions
    pub correct_predictions: usize,

    /// Overall accuracy in [0, 1]
    pub accuracy: f64,

    /// Macro-averaged precision (classes with support only)
    pub macro_precision: f64,

    pub macro_recall: f64,

    pub macro_f1: f64,

    /// Support-weighted precision
    pub weighted_precision: f64,

    pub weighted_recall: f64,

    pub weighted_f1: f64,

    /// Per-class metrics, indexed by class
    pub per_class: Vec<ClassMetrics>,

    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Compute metrics from predicted and true class indices.
    ///
    /// `class_names` supplies the labels used in the report; its length is the
    /// number of classes.
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        class_names: &[String],
    ) -> Result<Self> {
        if predictions.len() != ground_truth.len() {
            return Err(PlantError::InvalidInput(format!(
                "{} predictions for {} labels",
                predictions.len(),
                ground_truth.len()
            )));
        }

        let num_classes = class_names.len();
        let total_samples = predictions.len();
        if total_samples == 0 {
            return Ok(Self {
                confusion_matrix: ConfusionMatrix::new(num_classes),
                ..Self::default()
            });
        }

        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);

        let correct_predictions = confusion_matrix.correct();
        let accuracy = correct_predictions as f64 / total_samples as f64;

        let per_class: Vec<ClassMetrics> = class_names
            .iter()
            .enumerate()
            .map(|(class_idx, name)| {
                ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx).with_name(name)
            })
            .collect();

        let supported: Vec<&ClassMetrics> = per_class.iter().filter(|m| m.support > 0).collect();
        let macro_avg = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if supported.is_empty() {
                0.0
            } else {
                supported.iter().map(|m| f(m)).sum::<f64>() / supported.len() as f64
            }
        };

        let total_support: usize = per_class.iter().map(|m| m.support).sum();
        let weighted_avg = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if total_support == 0 {
                0.0
            } else {
                per_class
                    .iter()
                    .map(|m| f(m) * m.support as f64)
                    .sum::<f64>()
                    / total_support as f64
            }
        };

        Ok(Self {
            total_samples,
            correct_predictions,
            accuracy,
            macro_precision: macro_avg(|m| m.precision),
            macro_recall: macro_avg(|m| m.recall),
            macro_f1: macro_avg(|m| m.f1),
            weighted_precision: weighted_avg(|m| m.precision),
            weighted_recall: weighted_avg(|m| m.recall),
            weighted_f1: weighted_avg(|m| m.f1),
            per_class,
            confusion_matrix,
        })
    }

    /// Text classification report
    pub fn report(&self) -> String {
        let name_width = self
            .per_class
            .iter()
            .filter_map(|m| m.class_name.as_ref().map(|n| n.len()))
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(12);

        let mut out = String::new();
        out.push_str(&format!(
            "{:>w$}  {:>9} {:>9} {:>9} {:>9}\n\n",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            w = name_width
        ));

        for m in &self.per_class {
            let name = m
                .class_name
                .clone()
                .unwrap_or_else(|| m.class_idx.to_string());
            out.push_str(&format!(
                "{:>w$}  {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
                name,
                m.precision,
                m.recall,
                m.f1,
                m.support,
                w = name_width
            ));
        }

        out.push('\n');
        out.push_str(&format!(
            "{:>w$}  {:>9} {:>9} {:>9.2} {:>9}\n",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.total_samples,
            w = name_width
        ));
        out.push_str(&format!(
            "{:>w$}  {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
            "macro avg",
            self.macro_precision,
            self.macro_recall,
            self.macro_f1,
            self.total_samples,
            w = name_width
        ));
        out.push_str(&format!(
            "{:>w$}  {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
            "weighted avg",
            self.weighted_precision,
            self.weighted_recall,
            self.weighted_f1,
            self.total_samples,
            w = name_width
        ));

        out
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.report())
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_idx: usize,

    pub class_name: Option<String>,

    pub true_positives: usize,

    pub false_positives: usize,

    pub false_negatives: usize,

    /// Precision = TP / (TP + FP)
    pub precision: f64,

    /// Recall = TP / (TP + FN)
    pub recall: f64,

    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub f1: f64,

    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class, actually another
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class, predicted as another
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let support = true_positives + false_negatives;

        let precision = if true_positives + false_positives > 0 {
            true_positives as f64 / (true_positives + false_positives) as f64
        } else {
            0.0
        };

        let recall = if support > 0 {
            true_positives as f64 / support as f64
        } else {
            0.0
        };

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            class_name: None,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.class_name = Some(name.to_string());
        self
    }
}

/// Confusion matrix, row = actual class, column = predicted class
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,

    /// Flat row-major counts
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut cm = Self::new(num_classes);

        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }

        cm
    }

    /// Add a single prediction; out-of-range indices are ignored
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    /// Count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Save to CSV with class names as row and column headers
    pub fn save_csv(&self, path: &Path, class_names: &[String]) -> std::io::Result<()> {
        let label = |i: usize| {
            class_names
                .get(i)
                .cloned()
                .unwrap_or_else(|| i.to_string())
        };

        let mut content = String::from("actual\\predicted");
        for col in 0..self.num_classes {
            content.push(',');
            content.push_str(&label(col));
        }
        content.push('\n');

        for row in 0..self.num_classes {
            content.push_str(&label(row));
            for col in 0..self.num_classes {
                content.push_str(&format!(",{}", self.get(row, col)));
            }
            content.push('\n');
        }

        std::fs::write(path, content)
    }
}

/// Sample-weighted running mean, used for per-epoch loss and accuracy
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch mean computed over `n` samples
    pub fn add_batch(&mut self, batch_mean: f64, n: usize) {
        self.sum += batch_mean * n as f64;
        self.count += n;
    }

    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class_{}", i)).collect()
    }

    #[test]
    fn test_perfect_predictions() {
        let preds = vec![0, 1, 2, 0, 1, 2];
        let truth = vec![0, 1, 2, 0, 1, 2];
        let metrics = Metrics::from_predictions(&preds, &truth, &names(3)).unwrap();

        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.macro_f1, 1.0);
        assert_eq!(metrics.weighted_f1, 1.0);
    }

    #[test]
    fn test_partial_predictions() {
        // class 0: 2 of 3 right, class 1: 1 of 1 right
        let preds = vec![0, 0, 1, 1];
        let truth = vec![0, 0, 0, 1];
        let metrics = Metrics::from_predictions(&preds, &truth, &names(2)).unwrap();

        assert_eq!(metrics.correct_predictions, 3);
        assert!((metrics.accuracy - 0.75).abs() < 1e-9);

        let c0 = &metrics.per_class[0];
        assert_eq!(c0.support, 3);
        assert!((c0.precision - 1.0).abs() < 1e-9);
        assert!((c0.recall - 2.0 / 3.0).abs() < 1e-9);

        let c1 = &metrics.per_class[1];
        assert!((c1.precision - 0.5).abs() < 1e-9);
        assert!((c1.recall - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let result = Metrics::from_predictions(&[0, 1], &[0], &names(2));
        assert!(matches!(result, Err(PlantError::InvalidInput(_))));
    }

    #[test]
    fn test_empty_predictions() {
        let metrics = Metrics::from_predictions(&[], &[], &names(2)).unwrap();
        assert_eq!(metrics.total_samples, 0);
        assert_eq!(metrics.accuracy, 0.0);
    }

    #[test]
    fn test_report_lists_every_class() {
        let metrics = Metrics::from_predictions(&[0, 1], &[0, 1], &names(2)).unwrap();
        let report = metrics.report();
        assert!(report.contains("class_0"));
        assert!(report.contains("class_1"));
        assert!(report.contains("weighted avg"));
    }

    #[test]
    fn test_confusion_matrix() {
        let mut cm = ConfusionMatrix::new(3);
        cm.add(0, 0);
        cm.add(0, 1);
        cm.add(1, 1);
        cm.add(2, 2);
        cm.add(5, 0);

        assert_eq!(cm.total(), 4);
        assert_eq!(cm.correct(), 3);
        assert_eq!(cm.get(0, 1), 1);
        assert!((cm.accuracy() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_confusion_matrix_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cm.csv");
        let cm = ConfusionMatrix::from_predictions(&[0, 1, 1], &[0, 1, 0], 2);
        cm.save_csv(&path, &["healthy".into(), "diseased".into()]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "actual\\predicted,healthy,diseased");
        assert_eq!(lines[1], "healthy,1,1");
        assert_eq!(lines[2], "diseased,0,1");
    }

    #[test]
    fn test_running_average_weights_by_batch_size() {
        let mut avg = RunningAverage::new();
        avg.add_batch(1.0, 16);
        avg.add_batch(0.0, 4);
        assert_eq!(avg.count(), 20);
        assert!((avg.average() - 0.8).abs() < 1e-9);
    }
}
