//! Test-set evaluation and reporting

pub mod evaluator;

pub use evaluator::{
    save_predictions_csv, ClassificationReport, Evaluator, SamplePrediction, CONFUSION_FILE,
    PREDICTIONS_FILE, REPORT_FILE,
};
