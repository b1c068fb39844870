//! Error types for KOI classification.
//!
//! Whole-request failures (`SchemaMismatch`), internal invariant violations
//! (`Transform`), contained per-row failures (`RowProcessing`) and fatal
//! startup failures (`ArtifactLoad`) each get their own variant so callers can
//! route them without string matching.

use thiserror::Error;

/// Why one record could not be scored.
///
/// Batch inference records these per row instead of propagating them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowFailure {
    /// A text cell in a numeric column did not parse as a number.
    #[error("could not convert value '{value}' in column '{column}' to a number")]
    ValueParse {
        /// Schema column holding the value
        column: String,
        /// The offending raw text
        value: String,
    },

    /// A cell held a value of a type that can never be numeric.
    #[error("column '{column}' holds a {found} where a number was expected")]
    TypeMismatch {
        /// Schema column holding the value
        column: String,
        /// Description of the type found
        found: String,
    },

    /// Preprocessing rejected the assembled feature vector.
    #[error("feature transform failed: {0}")]
    Transform(String),
}

/// Main error type for the crate.
///
/// # Examples
///
/// ```
/// use koi_classifier::error::KoiError;
///
/// let err = KoiError::SchemaMismatch {
///     missing_columns: vec!["koi_period".to_string()],
/// };
/// assert!(err.to_string().contains("koi_period"));
/// ```
#[derive(Debug, Error)]
pub enum KoiError {
    /// Required feature columns are absent from the input.
    #[error("input is missing required feature columns: {}", .missing_columns.join(", "))]
    SchemaMismatch {
        /// Every absent schema column, in schema order
        missing_columns: Vec<String>,
    },

    /// Feature vector length disagrees with the fitted statistics.
    #[error("feature dimension mismatch: fitted on {expected} features, got {actual}")]
    Transform {
        /// Feature count the transform was fitted with
        expected: usize,
        /// Feature count supplied
        actual: usize,
    },

    /// A single record could not be scored.
    #[error("row processing failed: {0}")]
    RowProcessing(#[from] RowFailure),

    /// A persisted artifact is missing, corrupt or inconsistent.
    #[error("failed to load artifact '{artifact}': {reason}")]
    ArtifactLoad {
        /// Artifact file name
        artifact: String,
        /// What went wrong
        reason: String,
    },

    /// Invalid hyperparameter value provided.
    #[error("invalid hyperparameter: {param} = {value}, expected {constraint}")]
    InvalidHyperparameter {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// A training label is not one of the known dispositions.
    #[error("unknown disposition label '{0}'")]
    InvalidLabel(String),

    /// A model or transformer was used before `fit`.
    #[error("{0} is not fitted")]
    NotFitted(&'static str),

    /// Input failed a structural check (empty data, ragged rows, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Tabular input could not be read.
    #[error("data error: {0}")]
    Data(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl KoiError {
    /// Create a dimension mismatch error for the preprocessing stage.
    #[must_use]
    pub fn transform(expected: usize, actual: usize) -> Self {
        Self::Transform { expected, actual }
    }

    /// Create an empty input error
    #[must_use]
    pub fn empty_input(context: &str) -> Self {
        Self::Validation(format!("empty input: {context}"))
    }

    /// Create an invalid hyperparameter error.
    #[must_use]
    pub fn invalid_hyperparameter(
        param: &str,
        value: impl std::fmt::Display,
        constraint: &str,
    ) -> Self {
        Self::InvalidHyperparameter {
            param: param.to_string(),
            value: value.to_string(),
            constraint: constraint.to_string(),
        }
    }

    /// Prefixes a validation message with where it was found.
    #[must_use]
    pub(crate) fn within(self, context: impl std::fmt::Display) -> Self {
        match self {
            Self::Validation(msg) => Self::Validation(format!("{context}: {msg}")),
            other => Self::Validation(format!("{context}: {other}")),
        }
    }

    /// Create an artifact load error.
    #[must_use]
    pub fn artifact(artifact: &str, reason: impl Into<String>) -> Self {
        Self::ArtifactLoad {
            artifact: artifact.to_string(),
            reason: reason.into(),
        }
    }

    /// Columns reported missing, if this is a schema mismatch.
    #[must_use]
    pub fn missing_columns(&self) -> Option<&[String]> {
        match self {
            Self::SchemaMismatch { missing_columns } => Some(missing_columns),
            _ => None,
        }
    }
}

impl From<&'static str> for KoiError {
    fn from(msg: &'static str) -> Self {
        Self::Validation(msg.to_string())
    }
}

impl From<serde_json::Error> for KoiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<csv::Error> for KoiError {
    fn from(err: csv::Error) -> Self {
        Self::Data(err.to_string())
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, KoiError>;
