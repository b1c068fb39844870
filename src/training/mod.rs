//! Training and evaluation of the KOI classifier.
//!
//! [`train`] turns a labelled KOI table into an [`ArtifactBundle`] and a
//! [`ClassificationReport`] measured on a held-out stratified split.
//!
//! The preprocessor is fitted on the whole table before the split, so the
//! test rows contribute to the medians, means and stds. The reported test
//! metrics carry that small leakage.

use crate::artifacts::ArtifactBundle;
use crate::classification::LogisticRegression;
use crate::data::RawTable;
use crate::disposition::{Disposition, DISPOSITIONS, N_CLASSES};
use crate::ensemble::StackingClassifier;
use crate::error::{KoiError, Result};
use crate::metrics::ClassificationReport;
use crate::model_selection::stratified_train_test_split;
use crate::preprocessing::Preprocessor;
use crate::schema::FeatureSchema;
use crate::traits::{ProbabilisticClassifier, Transformer};
use crate::tree::{GradientBoostingClassifier, MaxFeatures, RandomForestClassifier};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Hyperparameters of one gradient boosting base learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    /// Boosting rounds
    pub n_estimators: usize,
    /// Shrinkage
    pub learning_rate: f32,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Histogram bins; `None` for exact splits
    pub max_bins: Option<usize>,
    /// Row fraction per round
    pub subsample: f32,
}

impl BoostingParams {
    /// 200 rounds of depth-3 trees with exact splits.
    #[must_use]
    pub fn exact() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.05,
            max_depth: 3,
            min_samples_leaf: 1,
            max_bins: None,
            subsample: 1.0,
        }
    }

    /// 200 rounds of depth-5 histogram trees on 80% row samples.
    #[must_use]
    pub fn histogram() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.05,
            max_depth: 5,
            min_samples_leaf: 20,
            max_bins: Some(255),
            subsample: 0.8,
        }
    }

    fn build(&self, random_state: u64) -> GradientBoostingClassifier {
        let model = GradientBoostingClassifier::new()
            .with_n_estimators(self.n_estimators)
            .with_learning_rate(self.learning_rate)
            .with_max_depth(self.max_depth)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_subsample(self.subsample)
            .with_random_state(random_state);
        match self.max_bins {
            Some(bins) => model.with_max_bins(bins),
            None => model,
        }
    }
}

/// Hyperparameters of the random forest base learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth; `None` grows until leaves are pure
    pub max_depth: Option<usize>,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Features examined per split
    pub max_features: MaxFeatures,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: None,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
        }
    }
}

impl ForestParams {
    fn build(&self, random_state: u64) -> RandomForestClassifier {
        let model = RandomForestClassifier::new(self.n_estimators)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_max_features(self.max_features)
            .with_random_state(random_state);
        match self.max_depth {
            Some(depth) => model.with_max_depth(depth),
            None => model,
        }
    }
}

/// Hyperparameters of the logistic regression meta-learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaParams {
    /// Inverse L2 strength
    pub c: f64,
    /// Iteration cap
    pub max_iter: usize,
    /// Gradient tolerance
    pub tol: f64,
}

impl Default for MetaParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tol: 1e-4,
        }
    }
}

impl MetaParams {
    fn build(&self) -> LogisticRegression {
        LogisticRegression::new()
            .with_c(self.c)
            .with_max_iter(self.max_iter)
            .with_tolerance(self.tol)
    }
}

/// Settings for [`train`].
///
/// Every field has a default, so a JSON file only needs the fields it
/// overrides at the top level. A learner section, when present, must be
/// complete.
///
/// # Example
///
/// ```
/// use koi_classifier::training::TrainingConfig;
///
/// let config: TrainingConfig = serde_json::from_str(r#"{"random_state": 7}"#).expect("valid json");
/// assert_eq!(config.random_state, 7);
/// assert_eq!(config.test_size, 0.2);
/// assert_eq!(config.label_column, "koi_disposition");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Column holding the disposition label
    pub label_column: String,
    /// Identifier and label columns excluded from the features
    pub drop_columns: Vec<String>,
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    /// Seed for the split and every seeded learner
    pub random_state: u64,
    /// Folds for out-of-fold meta features
    pub cv_folds: usize,
    /// First gradient boosting learner
    pub gbm_exact: BoostingParams,
    /// Second gradient boosting learner
    pub gbm_histogram: BoostingParams,
    /// Random forest learner
    pub forest: ForestParams,
    /// Meta-learner
    pub meta: MetaParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            label_column: "koi_disposition".to_string(),
            drop_columns: [
                "kepid",
                "kepoi_name",
                "kepler_name",
                "koi_disposition",
                "koi_pdisposition",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            test_size: 0.2,
            random_state: 42,
            cv_folds: 3,
            gbm_exact: BoostingParams::exact(),
            gbm_histogram: BoostingParams::histogram(),
            forest: ForestParams::default(),
            meta: MetaParams::default(),
        }
    }
}

impl TrainingConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the held-out fraction.
    #[must_use]
    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    /// Sets the seed.
    #[must_use]
    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    /// Sets the number of stacking folds.
    #[must_use]
    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    /// Replaces the excluded columns.
    #[must_use]
    pub fn with_drop_columns(mut self, columns: Vec<String>) -> Self {
        self.drop_columns = columns;
        self
    }

    /// Shrinks every base learner to `n_estimators` trees.
    #[must_use]
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.gbm_exact.n_estimators = n_estimators;
        self.gbm_histogram.n_estimators = n_estimators;
        self.forest.n_estimators = n_estimators;
        self
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or not valid configuration.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Builds the unfitted stacking ensemble described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the ensemble configuration is invalid.
    pub fn build_ensemble(&self) -> Result<StackingClassifier> {
        StackingClassifier::builder()
            .estimator("gbm_exact", self.gbm_exact.build(self.random_state))
            .estimator("gbm_histogram", self.gbm_histogram.build(self.random_state))
            .estimator("random_forest", self.forest.build(self.random_state))
            .final_estimator(self.meta.build())
            .cv(self.cv_folds)
            .n_classes(N_CLASSES)
            .build()
    }

    fn excluded_columns(&self) -> Vec<String> {
        let mut excluded = self.drop_columns.clone();
        if !excluded.contains(&self.label_column) {
            excluded.push(self.label_column.clone());
        }
        excluded
    }
}

/// Result of [`train`].
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Fitted schema, preprocessing and ensemble
    pub bundle: ArtifactBundle,
    /// Evaluation on the held-out split
    pub report: ClassificationReport,
    /// Training rows
    pub n_train: usize,
    /// Held-out rows
    pub n_test: usize,
}

/// Encodes the label column through the disposition table.
///
/// # Errors
///
/// `KoiError::InvalidLabel` for the first value that is not a known
/// disposition (including an empty cell).
pub fn encode_labels(table: &RawTable, label_column: &str) -> Result<Vec<usize>> {
    table
        .column_strings(label_column)?
        .iter()
        .map(|label| label.parse::<Disposition>().map(Disposition::index))
        .collect()
}

/// Trains the stacking ensemble on a labelled KOI table.
///
/// 1. The feature schema is every numeric column not excluded by the config.
/// 2. Labels are encoded through the disposition table.
/// 3. The preprocessor is fitted on all rows.
/// 4. Rows are split into stratified train/test sets.
/// 5. The ensemble is fitted on the train rows and evaluated on the test rows.
///
/// # Errors
///
/// Returns an error on unknown labels, when no numeric feature column
/// remains, or when any fitting step fails.
pub fn train(table: &RawTable, config: &TrainingConfig) -> Result<TrainingOutcome> {
    let y = encode_labels(table, &config.label_column)?;

    let columns = table.numeric_columns(&config.excluded_columns());
    if columns.is_empty() {
        return Err(KoiError::Validation(
            "no numeric feature columns remain after exclusions".to_string(),
        ));
    }
    let schema = FeatureSchema::new(columns)?;
    let x = table.to_feature_matrix(schema.columns())?;
    info!(
        rows = x.n_rows(),
        features = schema.len(),
        missing = x.count_missing(),
        "training data prepared"
    );

    let mut preprocessor = Preprocessor::new();
    let scaled = preprocessor.fit_transform(&x)?;

    let (train_idx, test_idx) =
        stratified_train_test_split(&y, config.test_size, config.random_state)?;
    let x_train = scaled.select_rows(&train_idx);
    let x_test = scaled.select_rows(&test_idx);
    let y_train: Vec<usize> = train_idx.iter().map(|&i| y[i]).collect();
    let y_test: Vec<usize> = test_idx.iter().map(|&i| y[i]).collect();
    info!(
        train = train_idx.len(),
        test = test_idx.len(),
        "stratified split"
    );

    let mut model = config.build_ensemble()?;
    model.fit(&x_train, &y_train)?;

    let y_pred = model.predict(&x_test)?;
    let labels: Vec<&str> = DISPOSITIONS.iter().map(|d| d.as_str()).collect();
    let report = ClassificationReport::new(&y_pred, &y_test, &labels)?;
    info!(
        accuracy = f64::from(report.accuracy),
        "evaluation on held-out split"
    );

    Ok(TrainingOutcome {
        bundle: ArtifactBundle::new(schema, preprocessor, model)?,
        report,
        n_train: train_idx.len(),
        n_test: test_idx.len(),
    })
}

#[cfg(test)]
mod tests;
