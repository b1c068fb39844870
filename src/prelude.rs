//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use koi_classifier::prelude::*;
//! ```

pub use crate::artifacts::ArtifactBundle;
pub use crate::data::{RawRecord, RawTable, RawValue};
pub use crate::disposition::Disposition;
pub use crate::error::{KoiError, Result};
pub use crate::inference::{BatchReport, ExplanationContext, InferenceService, Prediction};
pub use crate::metrics::ClassificationReport;
pub use crate::primitives::{Matrix, Vector};
pub use crate::traits::{ProbabilisticClassifier, Transformer};
pub use crate::training::{train, TrainingConfig};
