//! Preprocessing: median imputation followed by standardization.
//!
//! Statistics are fitted once and then applied identically at training and
//! inference time. Missing values are `NaN` inside matrices and `None` in
//! single rows.
//!
//! # Example
//!
//! ```
//! use koi_classifier::prelude::*;
//! use koi_classifier::preprocessing::Preprocessor;
//!
//! let data = Matrix::from_vec(4, 2, vec![
//!     1.0, 100.0,
//!     f32::NAN, 200.0,
//!     3.0, 300.0,
//!     5.0, 400.0,
//! ]).expect("valid matrix dimensions");
//!
//! let mut pre = Preprocessor::new();
//! pre.fit(&data).expect("fit should succeed");
//!
//! // The missing value takes the column median (3.0) before scaling.
//! let row = pre.transform_row(&[None, Some(250.0)]).expect("transform");
//! let direct = pre.transform_row(&[Some(3.0), Some(250.0)]).expect("transform");
//! assert_eq!(row, direct);
//! ```

use crate::error::{KoiError, Result};
use crate::primitives::Matrix;
use crate::serialization::safetensors::{self, SafeTensorsFile, UserMetadata};
use crate::traits::Transformer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Standard deviations below this are treated as zero.
pub const ZERO_STD_THRESHOLD: f32 = 1e-10;

/// Replaces missing values with the per-feature median.
///
/// A feature that is missing in every training row gets median 0.0.
///
/// # Example
///
/// ```
/// use koi_classifier::prelude::*;
/// use koi_classifier::preprocessing::SimpleImputer;
///
/// let data = Matrix::from_vec(3, 1, vec![1.0, f32::NAN, 5.0]).expect("valid matrix");
/// let mut imputer = SimpleImputer::new();
/// let filled = imputer.fit_transform(&data).expect("fit_transform");
/// assert_eq!(filled.get(1, 0), 3.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleImputer {
    /// Median of each feature (computed during fit).
    statistics: Option<Vec<f32>>,
}

impl SimpleImputer {
    /// Creates an unfitted imputer.
    #[must_use]
    pub fn new() -> Self {
        Self { statistics: None }
    }

    /// Creates a fitted imputer from known medians.
    #[must_use]
    pub fn from_statistics(statistics: Vec<f32>) -> Self {
        Self {
            statistics: Some(statistics),
        }
    }

    /// Per-feature medians, if fitted.
    #[must_use]
    pub fn statistics(&self) -> Option<&[f32]> {
        self.statistics.as_deref()
    }

    /// Returns true if the imputer has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.statistics.is_some()
    }

    fn fitted(&self) -> Result<&[f32]> {
        self.statistics
            .as_deref()
            .ok_or(KoiError::NotFitted("SimpleImputer"))
    }

    /// Fills one row.
    ///
    /// # Errors
    ///
    /// Returns an error if not fitted or the length differs from the fitted width.
    pub fn transform_row(&self, row: &[Option<f32>]) -> Result<Vec<f32>> {
        let medians = self.fitted()?;
        if row.len() != medians.len() {
            return Err(KoiError::transform(medians.len(), row.len()));
        }
        Ok(row
            .iter()
            .zip(medians)
            .map(|(value, &median)| match value {
                Some(v) if !v.is_nan() => *v,
                _ => median,
            })
            .collect())
    }

    /// Saves the medians to a SafeTensors file.
    ///
    /// # Errors
    ///
    /// Returns an error if the imputer is unfitted or saving fails.
    pub fn save_safetensors<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), String> {
        let statistics = self
            .statistics
            .as_ref()
            .ok_or_else(|| "Cannot save unfitted imputer. Call fit() first.".to_string())?;

        let mut tensors = BTreeMap::new();
        tensors.insert(
            "median".to_string(),
            (statistics.clone(), vec![statistics.len()]),
        );
        let mut meta = UserMetadata::new();
        meta.insert("strategy".to_string(), "median".to_string());

        safetensors::save_safetensors(path, &tensors, &meta)
    }

    /// Loads an imputer from a SafeTensors file.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or the file format is invalid.
    pub fn load_safetensors<P: AsRef<Path>>(path: P) -> std::result::Result<Self, String> {
        let file = SafeTensorsFile::open(path)?;
        if let Some(strategy) = file.user_metadata("strategy") {
            if strategy != "median" {
                return Err(format!("Unsupported imputation strategy '{strategy}'"));
            }
        }
        let median = file.get_tensor("median")?;
        if median.iter().any(|v| !v.is_finite()) {
            return Err("Imputer medians must be finite".to_string());
        }
        Ok(Self::from_statistics(median))
    }
}

impl Transformer for SimpleImputer {
    /// Computes the median of each feature, ignoring `NaN`.
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()> {
        let (n_samples, n_features) = x.shape();
        if n_samples == 0 {
            return Err("Cannot fit with zero samples".into());
        }

        let medians = (0..n_features)
            .map(|j| x.column(j).nan_median().unwrap_or(0.0))
            .collect();
        self.statistics = Some(medians);
        Ok(())
    }

    /// Replaces each `NaN` with its feature's median.
    fn transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let medians = self.fitted()?;
        let (n_samples, n_features) = x.shape();
        if n_features != medians.len() {
            return Err(KoiError::transform(medians.len(), n_features));
        }

        let data = x
            .as_slice()
            .iter()
            .enumerate()
            .map(|(idx, &v)| if v.is_nan() { medians[idx % n_features] } else { v })
            .collect();
        Ok(Matrix::from_vec(n_samples, n_features, data)?)
    }
}

/// Standardizes features by removing mean and scaling to unit variance.
///
/// The standard score of a sample x is: z = (x - mean) / std, using the
/// population standard deviation. A feature with zero spread maps every
/// input to 0.0.
///
/// # Example
///
/// ```
/// use koi_classifier::prelude::*;
/// use koi_classifier::preprocessing::StandardScaler;
///
/// let data = Matrix::from_vec(3, 2, vec![
///     0.0, 7.0,
///     1.0, 7.0,
///     2.0, 7.0,
/// ]).expect("valid matrix dimensions");
///
/// let mut scaler = StandardScaler::new();
/// let scaled = scaler.fit_transform(&data).expect("fit_transform should succeed");
///
/// assert!(scaled.get(0, 0) < 0.0);
/// assert_eq!(scaled.get(2, 1), 0.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Mean of each feature (computed during fit).
    mean: Option<Vec<f32>>,
    /// Standard deviation of each feature (computed during fit).
    std: Option<Vec<f32>>,
}

impl StandardScaler {
    /// Creates a new unfitted `StandardScaler`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mean: None,
            std: None,
        }
    }

    /// Creates a fitted scaler from known statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the vectors differ in length.
    pub fn from_statistics(mean: Vec<f32>, std: Vec<f32>) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(KoiError::transform(mean.len(), std.len()));
        }
        Ok(Self {
            mean: Some(mean),
            std: Some(std),
        })
    }

    /// Returns the mean of each feature, if fitted.
    #[must_use]
    pub fn mean(&self) -> Option<&[f32]> {
        self.mean.as_deref()
    }

    /// Returns the standard deviation of each feature, if fitted.
    #[must_use]
    pub fn std(&self) -> Option<&[f32]> {
        self.std.as_deref()
    }

    /// Returns true if the scaler has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.mean.is_some()
    }

    fn fitted(&self) -> Result<(&[f32], &[f32])> {
        match (&self.mean, &self.std) {
            (Some(mean), Some(std)) => Ok((mean, std)),
            _ => Err(KoiError::NotFitted("StandardScaler")),
        }
    }

    /// Standardizes a single value.
    fn scale(value: f32, mean: f32, std: f32) -> f32 {
        if std < ZERO_STD_THRESHOLD {
            0.0
        } else {
            (value - mean) / std
        }
    }

    /// Standardizes one row.
    ///
    /// # Errors
    ///
    /// Returns an error if not fitted or the length differs from the fitted width.
    pub fn transform_row(&self, row: &[f32]) -> Result<Vec<f32>> {
        let (mean, std) = self.fitted()?;
        if row.len() != mean.len() {
            return Err(KoiError::transform(mean.len(), row.len()));
        }
        Ok(row
            .iter()
            .zip(mean.iter().zip(std))
            .map(|(&v, (&m, &s))| Self::scale(v, m, s))
            .collect())
    }

    /// Saves the StandardScaler to a SafeTensors file.
    ///
    /// # Errors
    ///
    /// Returns an error if the scaler is unfitted or if saving fails.
    pub fn save_safetensors<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), String> {
        let (mean, std) = self
            .fitted()
            .map_err(|_| "Cannot save unfitted scaler. Call fit() first.".to_string())?;

        let mut tensors = BTreeMap::new();
        tensors.insert("mean".to_string(), (mean.to_vec(), vec![mean.len()]));
        tensors.insert("std".to_string(), (std.to_vec(), vec![std.len()]));

        safetensors::save_safetensors(path, &tensors, &UserMetadata::new())
    }

    /// Loads a StandardScaler from a SafeTensors file.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or if the file format is invalid.
    pub fn load_safetensors<P: AsRef<Path>>(path: P) -> std::result::Result<Self, String> {
        let file = SafeTensorsFile::open(path)?;
        let mean = file.get_tensor("mean")?;
        let std = file.get_tensor("std")?;

        if mean.len() != std.len() {
            return Err("Mean and std vectors have different lengths".to_string());
        }
        if mean.iter().chain(&std).any(|v| !v.is_finite()) || std.iter().any(|&s| s < 0.0) {
            return Err("Scaler statistics must be finite with non-negative std".to_string());
        }

        Ok(Self {
            mean: Some(mean),
            std: Some(std),
        })
    }
}

impl Transformer for StandardScaler {
    /// Computes the mean and population standard deviation of each feature.
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()> {
        let (n_samples, n_features) = x.shape();

        if n_samples == 0 {
            return Err("Cannot fit with zero samples".into());
        }

        // Accumulate in f64; catalogue columns span many orders of magnitude.
        let mut mean = vec![0.0f64; n_features];
        for i in 0..n_samples {
            for (j, m) in mean.iter_mut().enumerate() {
                *m += f64::from(x.get(i, j));
            }
        }
        for m in &mut mean {
            *m /= n_samples as f64;
        }

        let mut var = vec![0.0f64; n_features];
        for i in 0..n_samples {
            for (j, v) in var.iter_mut().enumerate() {
                let diff = f64::from(x.get(i, j)) - mean[j];
                *v += diff * diff;
            }
        }

        self.std = Some(
            var.iter()
                .map(|v| (v / n_samples as f64).sqrt() as f32)
                .collect(),
        );
        self.mean = Some(mean.into_iter().map(|m| m as f32).collect());

        Ok(())
    }

    /// Standardizes the data using fitted mean and std.
    fn transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let (mean, std) = self.fitted()?;

        let (n_samples, n_features) = x.shape();
        if n_features != mean.len() {
            return Err(KoiError::transform(mean.len(), n_features));
        }

        let mut result = vec![0.0; n_samples * n_features];
        for i in 0..n_samples {
            for j in 0..n_features {
                result[i * n_features + j] = Self::scale(x.get(i, j), mean[j], std[j]);
            }
        }

        Ok(Matrix::from_vec(n_samples, n_features, result)?)
    }
}

/// The full preprocessing stage: [`SimpleImputer`] then [`StandardScaler`].
///
/// The scaler is fitted on the imputed matrix, so imputed values take part in
/// the mean and std.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    imputer: SimpleImputer,
    scaler: StandardScaler,
}

impl Preprocessor {
    /// Creates an unfitted preprocessor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assembles a preprocessor from fitted parts.
    ///
    /// # Errors
    ///
    /// Returns an error if either part is unfitted or their widths disagree.
    pub fn from_parts(imputer: SimpleImputer, scaler: StandardScaler) -> Result<Self> {
        let n_imputed = imputer.fitted()?.len();
        let (mean, _) = scaler.fitted()?;
        if n_imputed != mean.len() {
            return Err(KoiError::transform(n_imputed, mean.len()));
        }
        Ok(Self { imputer, scaler })
    }

    /// The imputation stage.
    #[must_use]
    pub fn imputer(&self) -> &SimpleImputer {
        &self.imputer
    }

    /// The scaling stage.
    #[must_use]
    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Number of features the stage was fitted on.
    #[must_use]
    pub fn n_features(&self) -> Option<usize> {
        self.imputer.statistics().map(<[f32]>::len)
    }

    /// Returns true once both stages are fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.imputer.is_fitted() && self.scaler.is_fitted()
    }

    /// Imputes then standardizes one row.
    ///
    /// # Errors
    ///
    /// `KoiError::Transform` if the row length differs from the fitted width.
    pub fn transform_row(&self, row: &[Option<f32>]) -> Result<Vec<f32>> {
        let filled = self.imputer.transform_row(row)?;
        self.scaler.transform_row(&filled)
    }
}

impl Transformer for Preprocessor {
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()> {
        let imputed = self.imputer.fit_transform(x)?;
        self.scaler.fit(&imputed)
    }

    fn transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let imputed = self.imputer.transform(x)?;
        self.scaler.transform(&imputed)
    }
}

#[cfg(test)]
mod tests;
