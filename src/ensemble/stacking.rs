//! Stacking classifier implementation

use crate::classification::LogisticRegression;
use crate::error::{KoiError, Result};
use crate::model_selection::StratifiedKFold;
use crate::primitives::Matrix;
use crate::traits::{argmax, check_labelled, check_width, ensure, ProbabilisticClassifier};
use crate::tree::{GradientBoostingClassifier, RandomForestClassifier};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A layer-1 learner of the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BaseLearner {
    /// Multiclass gradient boosting
    GradientBoosting(GradientBoostingClassifier),
    /// Bagged decision trees
    RandomForest(RandomForestClassifier),
}

impl BaseLearner {
    /// Fixes the class count so every learner emits the same number of columns.
    #[must_use]
    pub fn with_n_classes(self, n_classes: usize) -> Self {
        match self {
            Self::GradientBoosting(m) => Self::GradientBoosting(m.with_n_classes(n_classes)),
            Self::RandomForest(m) => Self::RandomForest(m.with_n_classes(n_classes)),
        }
    }
}

impl BaseLearner {
    /// Feature count seen during `fit`.
    #[must_use]
    pub fn n_features(&self) -> usize {
        match self {
            Self::GradientBoosting(m) => m.n_features(),
            Self::RandomForest(m) => m.n_features(),
        }
    }

    /// Checks the learner's fitted internals.
    ///
    /// # Errors
    ///
    /// Returns the learner's own shape error.
    pub fn check_fitted(&self) -> Result<()> {
        match self {
            Self::GradientBoosting(m) => m.check_fitted(),
            Self::RandomForest(m) => m.check_fitted(),
        }
    }
}

impl From<GradientBoostingClassifier> for BaseLearner {
    fn from(model: GradientBoostingClassifier) -> Self {
        Self::GradientBoosting(model)
    }
}

impl From<RandomForestClassifier> for BaseLearner {
    fn from(model: RandomForestClassifier) -> Self {
        Self::RandomForest(model)
    }
}

impl ProbabilisticClassifier for BaseLearner {
    fn fit(&mut self, x: &Matrix<f32>, y: &[usize]) -> Result<()> {
        match self {
            Self::GradientBoosting(m) => m.fit(x, y),
            Self::RandomForest(m) => m.fit(x, y),
        }
    }

    fn predict_proba(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        match self {
            Self::GradientBoosting(m) => m.predict_proba(x),
            Self::RandomForest(m) => m.predict_proba(x),
        }
    }

    fn n_classes(&self) -> usize {
        match self {
            Self::GradientBoosting(m) => m.n_classes(),
            Self::RandomForest(m) => m.n_classes(),
        }
    }
}

/// A base learner with the name used in logs and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEstimator {
    /// Short identifier, e.g. `"gbm_a"`
    pub name: String,
    /// The learner itself
    pub learner: BaseLearner,
}

/// Two-layer stacking classifier.
///
/// `fit` first produces out-of-fold probabilities for every base learner with
/// a non-shuffled `StratifiedKFold`, trains the meta-learner on those
/// `n_estimators * n_classes` columns, and finally refits each base learner on
/// all of the training data. Prediction feeds the refitted learners'
/// probabilities to the meta-learner.
///
/// # Example
///
/// ```
/// use koi_classifier::ensemble::StackingClassifier;
/// use koi_classifier::prelude::*;
/// use koi_classifier::tree::RandomForestClassifier;
///
/// let x = Matrix::from_vec(12, 1, vec![
///     0.0, 0.1, 0.2, 0.3, 5.0, 5.1, 5.2, 5.3, 9.0, 9.1, 9.2, 9.3,
/// ]).expect("valid matrix");
/// let y = vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2];
///
/// let mut stack = StackingClassifier::builder()
///     .estimator("rf", RandomForestClassifier::new(10).with_random_state(1))
///     .cv(2)
///     .n_classes(3)
///     .build()
///     .expect("valid configuration");
/// stack.fit(&x, &y).expect("fit");
/// let (label, proba) = stack.predict_row(&[5.05]).expect("fitted");
/// assert_eq!(label, 1);
/// assert_eq!(proba.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackingClassifier {
    estimators: Vec<NamedEstimator>,
    final_estimator: LogisticRegression,
    cv: usize,
    n_classes: usize,
    n_features: Option<usize>,
}

impl StackingClassifier {
    /// Starts a builder with 3 folds, 3 classes and a default meta-learner.
    #[must_use]
    pub fn builder() -> StackingBuilder {
        StackingBuilder::new()
    }

    /// Base learners, in column order of the meta features.
    #[must_use]
    pub fn estimators(&self) -> &[NamedEstimator] {
        &self.estimators
    }

    /// The layer-2 model.
    #[must_use]
    pub fn final_estimator(&self) -> &LogisticRegression {
        &self.final_estimator
    }

    /// Number of cross-validation folds used for meta features.
    #[must_use]
    pub fn cv(&self) -> usize {
        self.cv
    }

    /// Feature count seen during `fit`, `None` before fitting.
    #[must_use]
    pub fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    /// Whether `fit` has completed.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.n_features.is_some()
    }

    fn fitted_width(&self) -> Result<usize> {
        self.n_features
            .ok_or(KoiError::NotFitted("StackingClassifier"))
    }

    /// Checks that every layer of a fitted (or decoded) stack agrees on
    /// feature and class counts, so prediction cannot index out of range.
    ///
    /// # Errors
    ///
    /// `KoiError::NotFitted` before `fit`, otherwise `KoiError::Validation`
    /// naming the offending learner.
    pub fn check_fitted(&self) -> Result<()> {
        let width = self.fitted_width()?;
        ensure(!self.estimators.is_empty(), || "stack has no base learners".to_string())?;
        for estimator in &self.estimators {
            let learner = &estimator.learner;
            learner
                .check_fitted()
                .and_then(|()| {
                    ensure(learner.n_features() == width, || {
                        format!("fitted on {} features, stack has {width}", learner.n_features())
                    })
                })
                .and_then(|()| {
                    ensure(learner.n_classes() == self.n_classes, || {
                        format!(
                            "predicts {} classes, stack has {}",
                            learner.n_classes(),
                            self.n_classes
                        )
                    })
                })
                .map_err(|e| e.within(format_args!("estimator '{}'", estimator.name)))?;
        }

        let meta = &self.final_estimator;
        let expected = self.estimators.len() * self.n_classes;
        meta.check_fitted()
            .and_then(|()| {
                ensure(
                    meta.n_features() == expected && meta.n_classes() == self.n_classes,
                    || {
                        format!(
                            "takes {} inputs and predicts {} classes, expected {expected} and {}",
                            meta.n_features(),
                            meta.n_classes(),
                            self.n_classes
                        )
                    },
                )
            })
            .map_err(|e| e.within("final estimator"))
    }

    /// Concatenated base-learner probabilities, `n_samples x (n_estimators * n_classes)`.
    ///
    /// # Errors
    ///
    /// Returns an error if not fitted or the feature count differs.
    pub fn meta_features(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        check_width(self.fitted_width()?, x)?;
        let blocks = self
            .estimators
            .iter()
            .map(|e| e.learner.predict_proba(x))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&Matrix<f32>> = blocks.iter().collect();
        Ok(Matrix::hstack(&refs)?)
    }

    /// Predicts one standardized feature vector.
    ///
    /// Returns the winning class index (ties go to the lowest index) and the
    /// meta-learner's probability for every class.
    ///
    /// # Errors
    ///
    /// Returns an error if not fitted or the row width differs.
    pub fn predict_row(&self, row: &[f32]) -> Result<(usize, Vec<f32>)> {
        let x = Matrix::from_vec(1, row.len(), row.to_vec())?;
        let meta = self.meta_features(&x)?;
        let proba = self.final_estimator.predict_proba_row(meta.row(0))?;
        Ok((argmax(&proba), proba))
    }

    /// Out-of-fold probabilities of one base learner.
    fn out_of_fold(
        &self,
        estimator: &NamedEstimator,
        x: &Matrix<f32>,
        y: &[usize],
        folds: &[(Vec<usize>, Vec<usize>)],
    ) -> Result<Matrix<f32>> {
        let template = estimator.learner.clone().with_n_classes(self.n_classes);
        let fold_proba = folds
            .par_iter()
            .enumerate()
            .map(|(k, (train, test))| {
                let mut learner = template.clone();
                let y_train: Vec<usize> = train.iter().map(|&i| y[i]).collect();
                learner.fit(&x.select_rows(train), &y_train)?;
                let proba = learner.predict_proba(&x.select_rows(test))?;
                debug!(
                    estimator = %estimator.name,
                    fold = k,
                    train = train.len(),
                    test = test.len(),
                    "out-of-fold predictions ready"
                );
                Ok(proba)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut oof = Matrix::zeros(x.n_rows(), self.n_classes);
        for ((_, test), proba) in folds.iter().zip(&fold_proba) {
            for (r, &i) in test.iter().enumerate() {
                oof.set_row(i, proba.row(r));
            }
        }
        Ok(oof)
    }
}

impl ProbabilisticClassifier for StackingClassifier {
    fn fit(&mut self, x: &Matrix<f32>, y: &[usize]) -> Result<()> {
        check_labelled(x, y.len())?;
        if let Some(&label) = y.iter().find(|&&l| l >= self.n_classes) {
            return Err(KoiError::Validation(format!(
                "label {label} is outside 0..{}",
                self.n_classes
            )));
        }
        let folds = StratifiedKFold::new(self.cv).split(y)?;

        let mut blocks = Vec::with_capacity(self.estimators.len());
        for estimator in &self.estimators {
            info!(estimator = %estimator.name, folds = self.cv, "generating out-of-fold predictions");
            blocks.push(self.out_of_fold(estimator, x, y, &folds)?);
        }
        let refs: Vec<&Matrix<f32>> = blocks.iter().collect();
        let meta = Matrix::hstack(&refs)?;

        let mut final_estimator = self.final_estimator.clone().with_n_classes(self.n_classes);
        final_estimator.fit(&meta, y)?;
        info!(
            meta_features = meta.n_cols(),
            iterations = final_estimator.n_iter(),
            "meta-learner fitted"
        );

        let n_classes = self.n_classes;
        let mut estimators = self.estimators.clone();
        for estimator in &mut estimators {
            info!(estimator = %estimator.name, samples = x.n_rows(), "refitting on full training data");
            let mut learner = estimator.learner.clone().with_n_classes(n_classes);
            learner.fit(x, y)?;
            estimator.learner = learner;
        }

        self.estimators = estimators;
        self.final_estimator = final_estimator;
        self.n_features = Some(x.n_cols());
        Ok(())
    }

    fn predict_proba(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let meta = self.meta_features(x)?;
        self.final_estimator.predict_proba(&meta)
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }
}

impl StackingClassifier {
    /// Serializes the ensemble with bincode.
    ///
    /// # Errors
    ///
    /// Returns `KoiError::Serialization` if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| KoiError::Serialization(format!("stacking model encoding failed: {e}")))
    }

    /// Restores an ensemble written by [`StackingClassifier::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `KoiError::Serialization` if the bytes are not a valid model.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| KoiError::Serialization(format!("stacking model decoding failed: {e}")))
    }
}

/// Builder for [`StackingClassifier`].
#[derive(Debug, Clone)]
pub struct StackingBuilder {
    estimators: Vec<NamedEstimator>,
    final_estimator: LogisticRegression,
    cv: usize,
    n_classes: usize,
}

impl StackingBuilder {
    fn new() -> Self {
        Self {
            estimators: Vec::new(),
            final_estimator: LogisticRegression::new(),
            cv: 3,
            n_classes: 3,
        }
    }

    /// Appends a named base learner.
    #[must_use]
    pub fn estimator(mut self, name: impl Into<String>, learner: impl Into<BaseLearner>) -> Self {
        self.estimators.push(NamedEstimator {
            name: name.into(),
            learner: learner.into(),
        });
        self
    }

    /// Replaces the meta-learner.
    #[must_use]
    pub fn final_estimator(mut self, model: LogisticRegression) -> Self {
        self.final_estimator = model;
        self
    }

    /// Sets the number of folds for out-of-fold predictions.
    #[must_use]
    pub fn cv(mut self, folds: usize) -> Self {
        self.cv = folds;
        self
    }

    /// Sets the number of classes.
    #[must_use]
    pub fn n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `KoiError::InvalidHyperparameter` without base learners, with
    /// fewer than 2 folds or 2 classes, or with duplicate learner names.
    pub fn build(self) -> Result<StackingClassifier> {
        if self.estimators.is_empty() {
            return Err(KoiError::invalid_hyperparameter(
                "estimators",
                "[]",
                "at least one base learner",
            ));
        }
        if self.cv < 2 {
            return Err(KoiError::invalid_hyperparameter("cv", self.cv, ">= 2"));
        }
        if self.n_classes < 2 {
            return Err(KoiError::invalid_hyperparameter(
                "n_classes",
                self.n_classes,
                ">= 2",
            ));
        }
        for (i, e) in self.estimators.iter().enumerate() {
            if self.estimators[..i].iter().any(|prev| prev.name == e.name) {
                return Err(KoiError::invalid_hyperparameter(
                    "estimators",
                    &e.name,
                    "unique names",
                ));
            }
        }
        Ok(StackingClassifier {
            estimators: self.estimators,
            final_estimator: self.final_estimator,
            cv: self.cv,
            n_classes: self.n_classes,
            n_features: None,
        })
    }
}
