//! Single-record and batch inference over a loaded [`ArtifactBundle`].
//!
//! The pipeline for one record is: schema check and reordering, numeric
//! parsing, imputation and scaling, stacking ensemble, label decoding and
//! confidence. Batch inference runs the same pipeline per row and records a
//! failed row instead of aborting the batch.
//!
//! # Example
//!
//! ```no_run
//! use koi_classifier::data::RawRecord;
//! use koi_classifier::inference::InferenceService;
//!
//! let service = InferenceService::from_dir("artifacts").expect("artifacts load");
//! let record: RawRecord = serde_json::from_str(r#"{"koi_period": 9.49, "koi_depth": 615.8}"#)
//!     .expect("valid json");
//! match service.predict_one(&record) {
//!     Ok(prediction) => println!("{} ({})", prediction.disposition, prediction.confidence),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

mod explanation;

pub use explanation::ExplanationContext;

use crate::artifacts::ArtifactBundle;
use crate::data::{RawRecord, RawTable};
use crate::disposition::{Disposition, N_CLASSES};
use crate::error::{KoiError, Result, RowFailure};
use crate::schema::FeatureSchema;
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Column that supplies batch row identifiers when present.
pub const ID_COLUMN: &str = "id";

// ============================================================================
// Results
// ============================================================================

/// Confidence as a percentage, rendered with two decimals (`"87.42%"`).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Confidence(f32);

impl Confidence {
    /// Confidence of a failed row.
    pub const ZERO: Self = Self(0.0);

    /// `max(probabilities) * 100`.
    #[must_use]
    pub fn from_probabilities(probabilities: &[f32]) -> Self {
        let max = probabilities.iter().copied().fold(0.0f32, f32::max);
        Self(max * 100.0)
    }

    /// The percentage value.
    #[must_use]
    pub fn percent(self) -> f32 {
        self.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

impl Serialize for Confidence {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Classification of one record.
///
/// Serializes as `{"prediction": "...", "confidence": "NN.NN%"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Winning disposition
    #[serde(rename = "prediction")]
    pub disposition: Disposition,
    /// Ensemble probability per class index
    #[serde(skip)]
    pub probabilities: [f32; N_CLASSES],
    /// Highest probability as a percentage
    pub confidence: Confidence,
}

impl Prediction {
    /// Builds a prediction from the ensemble's class index and probabilities.
    ///
    /// # Errors
    ///
    /// `RowFailure::Transform` if the index is not a disposition or the
    /// probability vector has the wrong length.
    pub fn from_model_output(
        class: usize,
        probabilities: Vec<f32>,
    ) -> std::result::Result<Self, RowFailure> {
        let disposition = Disposition::from_index(class)
            .ok_or_else(|| RowFailure::Transform(format!("class index {class} has no disposition")))?;
        let probabilities: [f32; N_CLASSES] = probabilities.try_into().map_err(|p: Vec<f32>| {
            RowFailure::Transform(format!(
                "expected {N_CLASSES} class probabilities, got {}",
                p.len()
            ))
        })?;
        Ok(Self {
            disposition,
            confidence: Confidence::from_probabilities(&probabilities),
            probabilities,
        })
    }
}

/// Outcome of scoring one batch row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// The row was classified
    Success(Prediction),
    /// The row could not be scored
    Failure(RowFailure),
}

impl RowOutcome {
    /// True for [`RowOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Status of a batch row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    /// Classified
    Success,
    /// Failed; see the row's `error`
    Error,
}

/// Marker reported as the prediction of a failed row.
pub const ERROR_MARKER: &str = "ERROR";

/// One row of a batch response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRow {
    /// Row identifier: the `id` cell, or the row position
    pub id: String,
    /// Disposition label, or `"ERROR"`
    pub prediction: String,
    /// Confidence, `"0.00%"` for failed rows
    pub confidence: String,
    /// Success or error
    pub status: RowStatus,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchRow {
    fn new(id: String, outcome: &RowOutcome) -> Self {
        match outcome {
            RowOutcome::Success(p) => Self {
                id,
                prediction: p.disposition.to_string(),
                confidence: p.confidence.to_string(),
                status: RowStatus::Success,
                error: None,
            },
            RowOutcome::Failure(failure) => Self {
                id,
                prediction: ERROR_MARKER.to_string(),
                confidence: Confidence::ZERO.to_string(),
                status: RowStatus::Error,
                error: Some(failure.to_string()),
            },
        }
    }
}

/// Batch response: rows in input order plus counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// Per-row results, in input order
    pub results: Vec<BatchRow>,
    /// Number of rows processed
    pub total_processed: usize,
    /// Number of rows classified
    pub successful: usize,
}

impl BatchReport {
    /// Renders identified outcomes as a report.
    #[must_use]
    pub fn from_outcomes(outcomes: &[(String, RowOutcome)]) -> Self {
        let results: Vec<BatchRow> = outcomes
            .iter()
            .map(|(id, outcome)| BatchRow::new(id.clone(), outcome))
            .collect();
        Self {
            total_processed: results.len(),
            successful: outcomes.iter().filter(|(_, o)| o.is_success()).count(),
            results,
        }
    }

    /// Number of failed rows.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.total_processed - self.successful
    }
}

// ============================================================================
// Service
// ============================================================================

/// Read-only inference over a shared artifact bundle.
///
/// Cloning is cheap; clones share the same bundle and can serve requests
/// from different threads.
#[derive(Debug, Clone)]
pub struct InferenceService {
    bundle: Arc<ArtifactBundle>,
}

impl InferenceService {
    /// Wraps an already loaded bundle.
    #[must_use]
    pub fn new(bundle: Arc<ArtifactBundle>) -> Self {
        Self { bundle }
    }

    /// Loads the bundle from an artifact directory.
    ///
    /// # Errors
    ///
    /// `KoiError::ArtifactLoad` if any artifact is missing, corrupt or
    /// inconsistent.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Ok(Self::new(Arc::new(ArtifactBundle::load(dir)?)))
    }

    /// The shared bundle.
    #[must_use]
    pub fn bundle(&self) -> &ArtifactBundle {
        &self.bundle
    }

    /// The feature schema requests are validated against.
    #[must_use]
    pub fn schema(&self) -> &FeatureSchema {
        self.bundle.schema()
    }

    /// Classifies one record.
    ///
    /// Extra fields are ignored; null values are imputed.
    ///
    /// # Errors
    ///
    /// `KoiError::SchemaMismatch` listing every absent schema column, or
    /// `KoiError::RowProcessing` if a present value is not numeric.
    pub fn predict_one(&self, record: &RawRecord) -> Result<Prediction> {
        let ordered = self.schema().validate_and_order(record)?;
        let values = self.schema().parse_values(ordered)?;
        let prediction = self.score(&values)?;
        debug!(
            prediction = %prediction.disposition,
            confidence = %prediction.confidence,
            "record classified"
        );
        Ok(prediction)
    }

    /// Runs preprocessing and the ensemble on parsed schema-ordered values.
    fn score(&self, values: &[Option<f32>]) -> std::result::Result<Prediction, RowFailure> {
        let scaled = self
            .bundle
            .preprocessor()
            .transform_row(values)
            .map_err(|e| RowFailure::Transform(e.to_string()))?;
        let (class, probabilities) = self
            .bundle
            .model()
            .predict_row(&scaled)
            .map_err(|e| RowFailure::Transform(e.to_string()))?;
        Prediction::from_model_output(class, probabilities)
    }

    /// Scores every row of a table, keeping failures as values.
    ///
    /// Ids come from the `id` column when present, otherwise the row
    /// position. Output order equals input order.
    ///
    /// # Errors
    ///
    /// `KoiError::SchemaMismatch` if a schema column is absent from the
    /// table header; no row is scored in that case.
    pub fn score_table(&self, table: &RawTable) -> Result<Vec<(String, RowOutcome)>> {
        let columns = self.schema().validate_table(table)?;
        let id_column = table.column_index(ID_COLUMN);

        let outcomes = (0..table.n_rows())
            .into_par_iter()
            .map(|i| {
                let row = table.row(i);
                let id = id_column.map_or_else(|| i.to_string(), |c| row[c].as_id());
                let outcome = match self
                    .schema()
                    .parse_values(columns.iter().map(|&c| &row[c]))
                    .and_then(|values| self.score(&values))
                {
                    Ok(prediction) => RowOutcome::Success(prediction),
                    Err(failure) => {
                        warn!(row = i, id = %id, error = %failure, "batch row failed");
                        RowOutcome::Failure(failure)
                    }
                };
                (id, outcome)
            })
            .collect();
        Ok(outcomes)
    }

    /// Classifies every row of a table.
    ///
    /// # Errors
    ///
    /// `KoiError::SchemaMismatch` if a schema column is absent from the
    /// table header. Per-row failures are reported inside the result.
    pub fn predict_batch(&self, table: &RawTable) -> Result<BatchReport> {
        let outcomes = self.score_table(table)?;
        let report = BatchReport::from_outcomes(&outcomes);
        debug!(
            total = report.total_processed,
            successful = report.successful,
            "batch classified"
        );
        Ok(report)
    }

    /// Classifies a list of JSON-style records as one batch.
    ///
    /// # Errors
    ///
    /// As [`InferenceService::predict_batch`]; an empty list is a
    /// `KoiError::Validation`.
    pub fn predict_records(&self, records: Vec<RawRecord>) -> Result<BatchReport> {
        if records.is_empty() {
            return Err(KoiError::empty_input("batch records"));
        }
        self.predict_batch(&RawTable::from_records(records)?)
    }
}

#[cfg(test)]
mod tests;
