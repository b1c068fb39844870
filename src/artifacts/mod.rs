//! Persisted model artifacts.
//!
//! A trained classifier is stored as a directory of four files:
//!
//! | File | Content |
//! |---|---|
//! | `model_columns.json` | ordered feature schema (JSON array) |
//! | `imputer.safetensors` | per-feature medians |
//! | `scaler.safetensors` | per-feature mean and std |
//! | `stacking_model.bin` | bincode-encoded stacking ensemble |
//!
//! Loading is eager and all-or-nothing: a missing or corrupt file, a model
//! whose internal shapes disagree, or files that disagree with each other,
//! fail with [`KoiError::ArtifactLoad`].

use crate::disposition::N_CLASSES;
use crate::ensemble::StackingClassifier;
use crate::error::{KoiError, Result};
use crate::preprocessing::{Preprocessor, SimpleImputer, StandardScaler};
use crate::schema::FeatureSchema;
use crate::traits::ProbabilisticClassifier;
use serde::Serialize;
use std::path::Path;
use tracing::info;

// ============================================================================
// File names
// ============================================================================

/// Ordered feature schema.
pub const SCHEMA_FILE: &str = "model_columns.json";

/// Imputation statistics.
pub const IMPUTER_FILE: &str = "imputer.safetensors";

/// Scaling statistics.
pub const SCALER_FILE: &str = "scaler.safetensors";

/// Serialized ensemble.
pub const MODEL_FILE: &str = "stacking_model.bin";

// ============================================================================
// Artifact bundle
// ============================================================================

/// Everything inference needs: schema, fitted preprocessing and fitted ensemble.
///
/// A bundle is immutable once built and is shared read-only between
/// concurrent requests.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactBundle {
    schema: FeatureSchema,
    preprocessor: Preprocessor,
    model: StackingClassifier,
}

/// The first cross-artifact disagreement, as `(artifact, reason)`.
fn inconsistency(
    schema: &FeatureSchema,
    preprocessor: &Preprocessor,
    model: &StackingClassifier,
) -> Option<(&'static str, String)> {
    let n = schema.len();
    match preprocessor.imputer().statistics() {
        None => return Some((IMPUTER_FILE, "imputer is not fitted".to_string())),
        Some(medians) if medians.len() != n => {
            return Some((
                IMPUTER_FILE,
                format!("{} medians for {n} schema columns", medians.len()),
            ))
        }
        Some(_) => {}
    }
    match (preprocessor.scaler().mean(), preprocessor.scaler().std()) {
        (Some(mean), Some(std)) if mean.len() == n && std.len() == n => {}
        (Some(mean), Some(std)) => {
            return Some((
                SCALER_FILE,
                format!(
                    "{} means and {} stds for {n} schema columns",
                    mean.len(),
                    std.len()
                ),
            ))
        }
        _ => return Some((SCALER_FILE, "scaler is not fitted".to_string())),
    }
    match model.n_features() {
        None => Some((MODEL_FILE, "ensemble is not fitted".to_string())),
        Some(width) if width != n => Some((
            MODEL_FILE,
            format!("ensemble expects {width} features, schema has {n}"),
        )),
        Some(_) if model.n_classes() != N_CLASSES => Some((
            MODEL_FILE,
            format!(
                "ensemble predicts {} classes, expected {N_CLASSES}",
                model.n_classes()
            ),
        )),
        Some(_) => model
            .check_fitted()
            .err()
            .map(|e| (MODEL_FILE, e.to_string())),
    }
}

impl ArtifactBundle {
    /// Assembles a bundle from fitted parts.
    ///
    /// # Errors
    ///
    /// Returns `KoiError::Validation` if a part is unfitted or the parts
    /// disagree on the feature count.
    pub fn new(
        schema: FeatureSchema,
        preprocessor: Preprocessor,
        model: StackingClassifier,
    ) -> Result<Self> {
        if let Some((artifact, reason)) = inconsistency(&schema, &preprocessor, &model) {
            return Err(KoiError::Validation(format!("{artifact}: {reason}")));
        }
        Ok(Self {
            schema,
            preprocessor,
            model,
        })
    }

    /// Ordered feature schema.
    #[must_use]
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Fitted imputer and scaler.
    #[must_use]
    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Fitted ensemble.
    #[must_use]
    pub fn model(&self) -> &StackingClassifier {
        &self.model
    }

    /// Writes the four artifact files into `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or any file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        self.schema.save_json(dir.join(SCHEMA_FILE))?;
        self.preprocessor
            .imputer()
            .save_safetensors(dir.join(IMPUTER_FILE))
            .map_err(KoiError::Serialization)?;
        self.preprocessor
            .scaler()
            .save_safetensors(dir.join(SCALER_FILE))
            .map_err(KoiError::Serialization)?;
        std::fs::write(dir.join(MODEL_FILE), self.model.to_bytes()?)?;

        info!(
            dir = %dir.display(),
            features = self.schema.len(),
            "artifacts saved"
        );
        Ok(())
    }

    /// Loads and cross-checks all four artifact files from `dir`.
    ///
    /// # Errors
    ///
    /// `KoiError::ArtifactLoad` naming the first file that is missing,
    /// unreadable, corrupt, or inconsistent with the others.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();

        let schema = FeatureSchema::load_json(dir.join(SCHEMA_FILE))
            .map_err(|e| KoiError::artifact(SCHEMA_FILE, e.to_string()))?;
        let imputer = SimpleImputer::load_safetensors(dir.join(IMPUTER_FILE))
            .map_err(|e| KoiError::artifact(IMPUTER_FILE, e))?;
        let scaler = StandardScaler::load_safetensors(dir.join(SCALER_FILE))
            .map_err(|e| KoiError::artifact(SCALER_FILE, e))?;
        let bytes = std::fs::read(dir.join(MODEL_FILE))
            .map_err(|e| KoiError::artifact(MODEL_FILE, e.to_string()))?;
        let model = StackingClassifier::from_bytes(&bytes)
            .map_err(|e| KoiError::artifact(MODEL_FILE, e.to_string()))?;

        let preprocessor = Preprocessor::from_parts(imputer, scaler)
            .map_err(|e| KoiError::artifact(SCALER_FILE, e.to_string()))?;
        if let Some((artifact, reason)) = inconsistency(&schema, &preprocessor, &model) {
            return Err(KoiError::artifact(artifact, reason));
        }

        info!(
            dir = %dir.display(),
            features = schema.len(),
            estimators = model.estimators().len(),
            "artifacts loaded"
        );
        Ok(Self {
            schema,
            preprocessor,
            model,
        })
    }

    /// Human-oriented description of the bundle.
    #[must_use]
    pub fn summary(&self) -> ArtifactSummary {
        let medians = self.preprocessor.imputer().statistics().unwrap_or(&[]);
        let means = self.preprocessor.scaler().mean().unwrap_or(&[]);
        let stds = self.preprocessor.scaler().std().unwrap_or(&[]);
        let features = self
            .schema
            .columns()
            .iter()
            .enumerate()
            .map(|(j, name)| FeatureSummary {
                name: name.clone(),
                median: medians.get(j).copied().unwrap_or(f32::NAN),
                mean: means.get(j).copied().unwrap_or(f32::NAN),
                std: stds.get(j).copied().unwrap_or(f32::NAN),
            })
            .collect();
        ArtifactSummary {
            n_features: self.schema.len(),
            features,
            estimators: self
                .model
                .estimators()
                .iter()
                .map(|e| e.name.clone())
                .collect(),
            cv: self.model.cv(),
            meta_iterations: self.model.final_estimator().n_iter(),
        }
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Fitted statistics of one feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSummary {
    /// Column name
    pub name: String,
    /// Imputation median
    pub median: f32,
    /// Scaling mean
    pub mean: f32,
    /// Scaling standard deviation
    pub std: f32,
}

/// Overview of a loaded bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactSummary {
    /// Schema width
    pub n_features: usize,
    /// Per-feature statistics, in schema order
    pub features: Vec<FeatureSummary>,
    /// Base learner names
    pub estimators: Vec<String>,
    /// Folds used for meta features
    pub cv: usize,
    /// Meta-learner optimizer iterations
    pub meta_iterations: usize,
}
