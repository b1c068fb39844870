//! Classification metrics for evaluating classifier performance.
//!
//! Provides accuracy, per-class precision/recall/F1, a confusion matrix and
//! a text report for multi-class classification.

use crate::error::{KoiError, Result};
use crate::primitives::Matrix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compute classification accuracy.
///
/// accuracy = `correct_predictions` / `total_predictions`. Pairs are taken up
/// to the shorter slice; an empty input scores 0.0.
///
/// # Examples
///
/// ```
/// use koi_classifier::metrics::classification::accuracy;
///
/// let y_true = vec![0, 1, 2, 0, 1, 2];
/// let y_pred = vec![0, 2, 1, 0, 0, 1];
/// let acc = accuracy(&y_pred, &y_true);
/// assert!((acc - 0.333333).abs() < 0.001);
/// ```
#[must_use]
pub fn accuracy(y_pred: &[usize], y_true: &[usize]) -> f32 {
    let n = y_pred.len().min(y_true.len());
    if n == 0 {
        return 0.0;
    }
    let correct = y_pred
        .iter()
        .zip(y_true.iter())
        .filter(|(p, t)| p == t)
        .count();
    correct as f32 / n as f32
}

/// Compute confusion matrix.
///
/// Element `[i, j]` counts samples with true label `i` predicted as `j`.
///
/// # Errors
///
/// Returns an error if the inputs differ in length, are empty, or hold a
/// label `>= n_classes`.
///
/// # Examples
///
/// ```
/// use koi_classifier::metrics::classification::confusion_matrix;
///
/// let y_true = vec![0, 0, 1, 1, 2, 2];
/// let y_pred = vec![0, 1, 1, 1, 2, 0];
/// let cm = confusion_matrix(&y_pred, &y_true, 3).expect("valid labels");
/// assert_eq!(cm.get(0, 1), 1);
/// assert_eq!(cm.get(1, 1), 2);
/// ```
pub fn confusion_matrix(y_pred: &[usize], y_true: &[usize], n_classes: usize) -> Result<Matrix<usize>> {
    check_labels(y_pred, y_true, n_classes)?;
    let mut data = vec![0usize; n_classes * n_classes];
    for (&true_label, &pred_label) in y_true.iter().zip(y_pred.iter()) {
        data[true_label * n_classes + pred_label] += 1;
    }
    Ok(Matrix::from_vec(n_classes, n_classes, data)?)
}

fn check_labels(y_pred: &[usize], y_true: &[usize], n_classes: usize) -> Result<()> {
    if y_pred.len() != y_true.len() {
        return Err(KoiError::Validation(format!(
            "{} predictions for {} labels",
            y_pred.len(),
            y_true.len()
        )));
    }
    if y_true.is_empty() {
        return Err(KoiError::empty_input("classification metrics"));
    }
    if let Some(&label) = y_true.iter().chain(y_pred).find(|&&l| l >= n_classes) {
        return Err(KoiError::Validation(format!(
            "label {label} is outside 0..{n_classes}"
        )));
    }
    Ok(())
}

/// Precision, recall, F1 and support of one class (or an average).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// TP / (TP + FP), 0 when nothing was predicted as the class
    pub precision: f32,
    /// TP / (TP + FN), 0 when the class has no samples
    pub recall: f32,
    /// Harmonic mean of precision and recall
    pub f1_score: f32,
    /// Number of true samples
    pub support: usize,
}

impl ClassMetrics {
    fn from_counts(tp: usize, fp: usize, fn_count: usize) -> Self {
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_count);
        let f1_score = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            precision,
            recall,
            f1_score,
            support: tp + fn_count,
        }
    }
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 {
        0.0
    } else {
        num as f32 / den as f32
    }
}

/// Per-class metrics derived from a confusion matrix.
#[must_use]
pub fn per_class_metrics(confusion: &Matrix<usize>) -> Vec<ClassMetrics> {
    let n = confusion.n_rows();
    (0..n)
        .map(|k| {
            let tp = confusion.get(k, k);
            let predicted: usize = (0..n).map(|i| confusion.get(i, k)).sum();
            let actual: usize = confusion.row(k).iter().sum();
            ClassMetrics::from_counts(tp, predicted - tp, actual - tp)
        })
        .collect()
}

/// Evaluation summary of a classifier on labelled data.
///
/// The `Display` impl renders the familiar precision/recall/f1-score/support
/// table with accuracy, macro and weighted averages.
///
/// # Examples
///
/// ```
/// use koi_classifier::metrics::classification::ClassificationReport;
///
/// let y_true = vec![0, 0, 1, 1, 2, 2];
/// let y_pred = vec![0, 0, 1, 2, 2, 2];
/// let report = ClassificationReport::new(&y_pred, &y_true, &["a", "b", "c"])
///     .expect("valid labels");
/// assert!((report.accuracy - 5.0 / 6.0).abs() < 1e-6);
/// assert!(report.to_string().contains("weighted avg"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Class names, by class index
    pub labels: Vec<String>,
    /// Metrics per class, by class index
    pub per_class: Vec<ClassMetrics>,
    /// Fraction of correct predictions
    pub accuracy: f32,
    /// Unweighted mean over classes
    pub macro_avg: ClassMetrics,
    /// Support-weighted mean over classes
    pub weighted_avg: ClassMetrics,
    /// Confusion matrix, rows are true classes
    pub confusion: Matrix<usize>,
}

impl ClassificationReport {
    /// Builds a report; the class count is `labels.len()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs differ in length, are empty, or hold a
    /// label without a name.
    pub fn new<S: AsRef<str>>(y_pred: &[usize], y_true: &[usize], labels: &[S]) -> Result<Self> {
        let confusion = confusion_matrix(y_pred, y_true, labels.len())?;
        let per_class = per_class_metrics(&confusion);
        let total = y_true.len();

        let average = |weight: &dyn Fn(&ClassMetrics) -> f32| -> ClassMetrics {
            let mut sum = (0.0, 0.0, 0.0);
            for m in &per_class {
                let w = weight(m);
                sum.0 += m.precision * w;
                sum.1 += m.recall * w;
                sum.2 += m.f1_score * w;
            }
            ClassMetrics {
                precision: sum.0,
                recall: sum.1,
                f1_score: sum.2,
                support: total,
            }
        };
        let n_classes = per_class.len() as f32;
        let macro_avg = average(&|_| 1.0 / n_classes);
        let weighted_avg = average(&|m| m.support as f32 / total as f32);

        Ok(Self {
            labels: labels.iter().map(|l| l.as_ref().to_string()).collect(),
            accuracy: accuracy(y_pred, y_true),
            per_class,
            macro_avg,
            weighted_avg,
            confusion,
        })
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .labels
            .iter()
            .map(String::len)
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(0);

        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;

        for (name, metrics) in self.labels.iter().zip(&self.per_class) {
            write_row(f, width, name, metrics)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        write_row(f, width, "macro avg", &self.macro_avg)?;
        write_row(f, width, "weighted avg", &self.weighted_avg)
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, width: usize, name: &str, m: &ClassMetrics) -> fmt::Result {
    writeln!(
        f,
        "{name:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
        m.precision, m.recall, m.f1_score, m.support
    )
}
