//! Utilities: error types, logging, metrics, charts and formatting helpers
//!
//! ## Metrics
//!
//! The metrics module backs the evaluator's classification report:
//! - Per-class precision, recall, and F1-score
//! - Macro and support-weighted averages
//! - Confusion matrix with CSV export

pub mod charts;
pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{PlantError, Result};
pub use logging::{init_logging, LogConfig, TrainingLogger};
pub use metrics::{ClassMetrics, ConfusionMatrix, Metrics};

/// Round to a fixed number of decimal places (half away from zero)
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

/// Format a number with thousands separator
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(97.53219, 2), 97.53);
        assert_eq!(round_to(99.999, 2), 100.0);
        assert_eq!(round_to(0.004, 2), 0.0);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(11400), "11,400");
        assert_eq!(format_number(42), "42");
    }
}
