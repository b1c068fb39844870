//! Core traits for learners and transformers.
//!
//! These traits are the seams the stacking ensemble and the preprocessing
//! stage are built on.

use crate::error::{KoiError, Result};
use crate::primitives::Matrix;

/// Trait for data transformers (imputers, scalers).
///
/// # Examples
///
/// ```
/// use koi_classifier::prelude::*;
/// use koi_classifier::preprocessing::StandardScaler;
///
/// let x = Matrix::from_vec(3, 1, vec![1.0, 2.0, 3.0]).expect("valid matrix");
/// let mut scaler = StandardScaler::new();
/// let scaled = scaler.fit_transform(&x).expect("fit_transform should succeed");
/// assert!(scaled.get(1, 0).abs() < 1e-6);
/// ```
pub trait Transformer {
    /// Fits the transformer to data.
    ///
    /// # Errors
    ///
    /// Returns an error if fitting fails.
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()>;

    /// Transforms data using fitted parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if transformer is not fitted or the feature count differs.
    fn transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>>;

    /// Fits and transforms in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if fitting fails.
    fn fit_transform(&mut self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        self.fit(x)?;
        self.transform(x)
    }
}

/// Supervised classifier producing a probability per class.
///
/// Labels are class indices in `0..n_classes`. `predict_proba` returns an
/// `n_samples x n_classes` matrix whose rows sum to 1.
pub trait ProbabilisticClassifier {
    /// Fits the classifier.
    ///
    /// # Errors
    ///
    /// Returns an error on empty input or mismatched lengths.
    fn fit(&mut self, x: &Matrix<f32>, y: &[usize]) -> Result<()>;

    /// Class probabilities for each sample.
    ///
    /// # Errors
    ///
    /// Returns an error if not fitted or the feature count differs.
    fn predict_proba(&self, x: &Matrix<f32>) -> Result<Matrix<f32>>;

    /// Number of classes the classifier was configured for.
    fn n_classes(&self) -> usize;

    /// Predicted class index per sample (argmax, ties to the lowest index).
    ///
    /// # Errors
    ///
    /// Propagates errors from `predict_proba`.
    fn predict(&self, x: &Matrix<f32>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok((0..proba.n_rows()).map(|i| argmax(proba.row(i))).collect())
    }

    /// Accuracy on labelled data.
    ///
    /// # Errors
    ///
    /// Propagates errors from `predict`.
    fn score(&self, x: &Matrix<f32>, y: &[usize]) -> Result<f32> {
        let predictions = self.predict(x)?;
        Ok(crate::metrics::classification::accuracy(&predictions, y))
    }
}

/// Checks that `x` and `y` describe the same non-empty sample set.
///
/// # Errors
///
/// Returns `KoiError::Validation` on empty input or a length mismatch.
pub(crate) fn check_labelled(x: &Matrix<f32>, n_labels: usize) -> Result<()> {
    if x.n_rows() != n_labels {
        return Err(KoiError::Validation(format!(
            "x has {} samples but y has {n_labels}",
            x.n_rows()
        )));
    }
    if x.n_rows() == 0 {
        return Err("Cannot fit with zero samples".into());
    }
    if x.n_cols() == 0 {
        return Err("Cannot fit with zero features".into());
    }
    Ok(())
}

/// Class count for a fit: the configured value, or one past the largest label.
///
/// # Errors
///
/// Returns `KoiError::Validation` if a label is outside the configured range.
pub(crate) fn resolve_n_classes(configured: Option<usize>, y: &[usize]) -> Result<usize> {
    let observed = y.iter().max().map_or(0, |&m| m + 1);
    match configured {
        Some(n) if observed > n => Err(KoiError::Validation(format!(
            "label {} is outside 0..{n}",
            observed - 1
        ))),
        Some(n) => Ok(n),
        None => Ok(observed.max(2)),
    }
}

/// Checks that a prediction input has the fitted feature count.
///
/// # Errors
///
/// Returns `KoiError::Validation` on a width mismatch.
pub(crate) fn check_width(expected: usize, x: &Matrix<f32>) -> Result<()> {
    if x.n_cols() == expected {
        Ok(())
    } else {
        Err(KoiError::Validation(format!(
            "expected {expected} features, got {}",
            x.n_cols()
        )))
    }
}

/// Fails with `KoiError::Validation` carrying `message()` unless `holds`.
pub(crate) fn ensure(holds: bool, message: impl FnOnce() -> String) -> Result<()> {
    if holds {
        Ok(())
    } else {
        Err(KoiError::Validation(message()))
    }
}

/// Index of the largest value; the first index wins ties.
///
/// Returns 0 for an empty slice.
#[must_use]
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    // Mock transformer to test trait default methods
    struct MockTransformer {
        fitted: bool,
        scale: f32,
    }

    impl Transformer for MockTransformer {
        fn fit(&mut self, x: &Matrix<f32>) -> Result<()> {
            if x.n_rows() == 0 {
                return Err(KoiError::empty_input("mock fit"));
            }
            self.scale = x.as_slice().iter().sum::<f32>() / x.as_slice().len() as f32;
            self.fitted = true;
            Ok(())
        }

        fn transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
            if !self.fitted {
                return Err(KoiError::NotFitted("MockTransformer"));
            }
            let data = x.as_slice().iter().map(|v| v / self.scale).collect();
            Ok(Matrix::from_vec(x.n_rows(), x.n_cols(), data)?)
        }
    }

    struct ConstantClassifier {
        proba: Vec<f32>,
    }

    impl ProbabilisticClassifier for ConstantClassifier {
        fn fit(&mut self, _x: &Matrix<f32>, _y: &[usize]) -> Result<()> {
            Ok(())
        }

        fn predict_proba(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
            let mut data = Vec::with_capacity(x.n_rows() * self.proba.len());
            for _ in 0..x.n_rows() {
                data.extend_from_slice(&self.proba);
            }
            Ok(Matrix::from_vec(x.n_rows(), self.proba.len(), data)?)
        }

        fn n_classes(&self) -> usize {
            self.proba.len()
        }
    }

    #[test]
    fn test_transformer_fit_transform_default() {
        let mut transformer = MockTransformer {
            fitted: false,
            scale: 1.0,
        };
        let x = Matrix::from_vec(2, 2, vec![2.0, 4.0, 6.0, 8.0]).expect("matrix");
        let transformed = transformer.fit_transform(&x).expect("should succeed");
        assert!(transformer.fitted);
        assert!((transformed.get(0, 0) - 0.4).abs() < f32::EPSILON);
        assert!((transformed.get(1, 1) - 1.6).abs() < f32::EPSILON);
    }

    #[test]
    fn test_transformer_transform_without_fit() {
        let transformer = MockTransformer {
            fitted: false,
            scale: 1.0,
        };
        let x = Matrix::from_vec(1, 1, vec![1.0]).expect("matrix");
        let err = transformer.transform(&x).unwrap_err();
        assert!(err.to_string().contains("not fitted"));
    }

    #[test]
    fn test_default_predict_uses_argmax() {
        let clf = ConstantClassifier {
            proba: vec![0.2, 0.5, 0.3],
        };
        let x = Matrix::zeros(3, 2);
        assert_eq!(clf.predict(&x).expect("predict"), vec![1, 1, 1]);
        assert!((clf.score(&x, &[1, 1, 0]).expect("score") - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_check_labelled() {
        let x = Matrix::zeros(2, 1);
        assert!(check_labelled(&x, 2).is_ok());
        assert!(check_labelled(&x, 3).is_err());
        assert!(check_labelled(&Matrix::zeros(0, 1), 0).is_err());
    }

    #[test]
    fn test_resolve_n_classes() {
        assert_eq!(resolve_n_classes(Some(3), &[0, 1]).expect("fits"), 3);
        assert_eq!(resolve_n_classes(None, &[0, 2, 1]).expect("fits"), 3);
        assert_eq!(resolve_n_classes(None, &[0, 0]).expect("fits"), 2);
        assert!(resolve_n_classes(Some(2), &[0, 2]).is_err());
    }

    #[test]
    fn test_argmax_ties_break_low() {
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), 0);
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0]), 0);
        assert_eq!(argmax(&[]), 0);
    }
}
