//! KOI classifier: disposition prediction for Kepler Objects of Interest.
//!
//! A stacking ensemble (two gradient boosting models and a random forest,
//! combined by a multinomial logistic regression) assigns each object one of
//! `FALSE POSITIVE`, `CONFIRMED` or `CANDIDATE` together with a confidence.
//! The crate covers both sides of the model lifecycle: training from a
//! labelled KOI table into a directory of artifacts, and single-record or
//! batch inference from those artifacts.
//!
//! # Quick Start
//!
//! ```no_run
//! use koi_classifier::prelude::*;
//!
//! let table = RawTable::from_csv_path("koi_cumulative.csv")?;
//! let outcome = train(&table, &TrainingConfig::default())?;
//! println!("{}", outcome.report);
//! outcome.bundle.save("artifacts")?;
//!
//! let service = InferenceService::from_dir("artifacts")?;
//! let record: RawRecord = serde_json::from_str(r#"{"koi_period": 9.49, "koi_depth": 615.8}"#)?;
//! let prediction = service.predict_one(&record)?;
//! println!("{} with {} confidence", prediction.disposition, prediction.confidence);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Modules
//!
//! - [`primitives`]: Dense `Matrix` and `Vector` types
//! - [`data`]: Untyped tabular input (CSV, JSON records)
//! - [`disposition`]: Label set and class-index encoding
//! - [`schema`]: Ordered feature schema and record validation
//! - [`preprocessing`]: Median imputation and standard scaling
//! - [`tree`]: Decision trees, random forest, gradient boosting
//! - [`classification`]: Multinomial logistic regression
//! - [`ensemble`]: Stacking ensemble
//! - [`model_selection`]: Stratified folds and train/test split
//! - [`metrics`]: Accuracy, confusion matrix, classification report
//! - [`serialization`]: SafeTensors storage for fitted statistics
//! - [`artifacts`]: Persisted model bundle
//! - [`training`]: Training and evaluation
//! - [`inference`]: Single-record and batch prediction

pub mod artifacts;
pub mod classification;
pub mod data;
pub mod disposition;
pub mod ensemble;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod model_selection;
pub mod prelude;
pub mod preprocessing;
pub mod primitives;
pub mod schema;
pub mod serialization;
pub mod traits;
pub mod training;
pub mod tree;

pub use error::{KoiError, Result, RowFailure};
pub use primitives::{Matrix, Vector};
pub use traits::{ProbabilisticClassifier, Transformer};
