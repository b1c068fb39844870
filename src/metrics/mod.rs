//! Evaluation metrics for ML models.
//!
//! Classification metrics (accuracy, precision, recall, F1-score, confusion
//! matrix) and the text report printed after training.

pub mod classification;

pub use classification::{accuracy, confusion_matrix, ClassMetrics, ClassificationReport};
