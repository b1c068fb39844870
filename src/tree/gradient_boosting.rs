//! Gradient Boosting Classifier implementation.
//!
//! Implements multiclass gradient boosting with regression trees as weak
//! learners and the multinomial deviance loss.

use super::binning::BinMapper;
use super::builder::{presort, GrowthParams, SplitStrategy};
use super::DecisionTreeRegressor;
use crate::error::{KoiError, Result};
use crate::primitives::Matrix;
use crate::traits::{
    check_labelled, check_width, ensure, resolve_n_classes, ProbabilisticClassifier,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gradient Boosting Classifier.
///
/// # Algorithm
///
/// 1. Initialize each class score with the log of its prior
/// 2. For each boosting iteration:
///    - Compute softmax probabilities and pseudo-residuals `y_k - p_k`
///    - Fit one regression tree per class to its residuals
///    - Set each leaf to a Newton step `(K-1)/K * sum(r) / sum(|r|(1-|r|))`
///    - Add `learning_rate * tree_prediction` to the class score
/// 3. Final prediction = softmax(class scores)
///
/// Splits are exact by default; `with_max_bins` switches to histogram splits
/// over pre-binned features. `with_subsample` below 1.0 fits each round on a
/// random fraction of rows drawn without replacement.
///
/// # Example
///
/// ```
/// use koi_classifier::prelude::*;
/// use koi_classifier::tree::GradientBoostingClassifier;
///
/// let x = Matrix::from_vec(6, 1, vec![0.0, 0.5, 1.0, 5.0, 5.5, 6.0]).expect("valid matrix");
/// let y = vec![0, 0, 0, 1, 1, 1];
///
/// let mut gbm = GradientBoostingClassifier::new()
///     .with_n_estimators(50)
///     .with_learning_rate(0.1)
///     .with_max_depth(2);
///
/// gbm.fit(&x, &y).expect("fit");
/// assert_eq!(gbm.predict(&x).expect("predict"), y);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    /// Number of boosting iterations
    n_estimators: usize,
    /// Learning rate (shrinkage parameter)
    learning_rate: f32,
    /// Maximum depth of each tree
    max_depth: usize,
    /// Minimum samples in each leaf
    min_samples_leaf: usize,
    /// Histogram bin count; `None` for exact splits
    max_bins: Option<usize>,
    /// Fraction of rows used per iteration
    subsample: f32,
    random_state: Option<u64>,
    n_classes: Option<usize>,
    n_features: usize,
    /// Initial score per class (log prior)
    init_scores: Vec<f32>,
    /// One tree per class for each iteration
    estimators: Vec<Vec<DecisionTreeRegressor>>,
}

impl Default for GradientBoostingClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl GradientBoostingClassifier {
    /// Creates a new Gradient Boosting Classifier with default parameters.
    ///
    /// # Default Parameters
    ///
    /// - `n_estimators`: 100
    /// - `learning_rate`: 0.1
    /// - `max_depth`: 3
    /// - `min_samples_leaf`: 1
    /// - exact splits, no subsampling
    #[must_use]
    pub fn new() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            max_bins: None,
            subsample: 1.0,
            random_state: None,
            n_classes: None,
            n_features: 0,
            init_scores: Vec::new(),
            estimators: Vec::new(),
        }
    }

    /// Sets the number of boosting iterations.
    #[must_use]
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    /// Sets the learning rate (shrinkage parameter).
    ///
    /// Lower values require more trees but often lead to better generalization.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the maximum depth of each tree.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the minimum number of samples in each leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Uses histogram splits with at most `max_bins` bins per feature.
    #[must_use]
    pub fn with_max_bins(mut self, max_bins: usize) -> Self {
        self.max_bins = Some(max_bins);
        self
    }

    /// Sets the fraction of rows drawn for each iteration.
    #[must_use]
    pub fn with_subsample(mut self, subsample: f32) -> Self {
        self.subsample = subsample;
        self
    }

    /// Sets the random state for reproducibility.
    #[must_use]
    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = Some(random_state);
        self
    }

    /// Fixes the number of classes instead of inferring it from labels.
    #[must_use]
    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = Some(n_classes);
        self
    }

    /// Returns the number of fitted iterations.
    #[must_use]
    pub fn n_iterations(&self) -> usize {
        self.estimators.len()
    }

    /// Feature count seen during `fit`.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Checks that every boosting round holds one tree per class and that the
    /// trees agree with the model's feature count.
    ///
    /// # Errors
    ///
    /// `KoiError::NotFitted` without rounds, `KoiError::Validation` for any
    /// shape disagreement.
    pub fn check_fitted(&self) -> Result<()> {
        if self.estimators.is_empty() {
            return Err(KoiError::NotFitted("GradientBoostingClassifier"));
        }
        let n_classes = self.n_classes();
        ensure(n_classes > 0 && self.init_scores.len() == n_classes, || {
            format!(
                "{} initial scores for {n_classes} classes",
                self.init_scores.len()
            )
        })?;
        for (round, trees) in self.estimators.iter().enumerate() {
            ensure(trees.len() == n_classes, || {
                format!("round {round} has {} trees, expected {n_classes}", trees.len())
            })?;
            for tree in trees {
                tree.check_fitted(self.n_features)
                    .map_err(|e| e.within(format_args!("round {round}")))?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(KoiError::invalid_hyperparameter("n_estimators", 0, ">= 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(KoiError::invalid_hyperparameter(
                "learning_rate",
                self.learning_rate,
                "a finite value > 0",
            ));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(KoiError::invalid_hyperparameter(
                "subsample",
                self.subsample,
                "a value in (0, 1]",
            ));
        }
        if self.max_depth == 0 {
            return Err(KoiError::invalid_hyperparameter("max_depth", 0, ">= 1"));
        }
        Ok(())
    }

    fn raw_scores(&self, row: &[f32]) -> Result<Vec<f32>> {
        let mut scores = self.init_scores.clone();
        for round in &self.estimators {
            for (score, tree) in scores.iter_mut().zip(round) {
                *score += self.learning_rate * tree.predict_row(row)?;
            }
        }
        Ok(scores)
    }
}

/// Numerically stable softmax.
fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

impl ProbabilisticClassifier for GradientBoostingClassifier {
    fn fit(&mut self, x: &Matrix<f32>, y: &[usize]) -> Result<()> {
        check_labelled(x, y.len())?;
        self.validate()?;
        let n_classes = resolve_n_classes(self.n_classes, y)?;
        let (n_samples, n_features) = x.shape();
        let params = GrowthParams {
            max_depth: Some(self.max_depth),
            min_samples_split: 2,
            min_samples_leaf: self.min_samples_leaf,
            max_features: None,
        };

        let (presorted, binned) = match self.max_bins {
            Some(bins) => (Vec::new(), Some(BinMapper::fit(x, bins)?.transform(x))),
            None => (presort(x), None),
        };

        // Log-prior initialisation
        let mut counts = vec![0usize; n_classes];
        for &label in y {
            counts[label] += 1;
        }
        self.init_scores = counts
            .iter()
            .map(|&c| (c as f32 / n_samples as f32).max(f32::EPSILON).ln())
            .collect();

        let mut raw: Vec<Vec<f32>> = vec![self.init_scores.clone(); n_samples];
        let mut rng = match self.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let n_draw = ((self.subsample * n_samples as f32) as usize).clamp(1, n_samples);
        let newton_scale = (n_classes as f32 - 1.0) / n_classes as f32;

        self.estimators.clear();
        for iteration in 0..self.n_estimators {
            let samples: Vec<usize> = if n_draw < n_samples {
                let mut drawn = rand::seq::index::sample(&mut rng, n_samples, n_draw).into_vec();
                drawn.sort_unstable();
                drawn
            } else {
                (0..n_samples).collect()
            };

            let proba: Vec<Vec<f32>> = raw.iter().map(|scores| softmax(scores)).collect();

            let round = (0..n_classes)
                .into_par_iter()
                .map(|k| {
                    let residuals: Vec<f32> = (0..n_samples)
                        .map(|i| f32::from(u8::from(y[i] == k)) - proba[i][k])
                        .collect();
                    let hessians: Vec<f32> = residuals
                        .iter()
                        .map(|r| r.abs() * (1.0 - r.abs()) / newton_scale)
                        .collect();
                    let strategy = match &binned {
                        Some(b) => SplitStrategy::Histogram(b),
                        None => SplitStrategy::Exact {
                            presorted: &presorted,
                        },
                    };
                    let mut tree = DecisionTreeRegressor::new().with_params(params);
                    tree.fit_gradient(x, &residuals, Some(&hessians), &samples, strategy)?;
                    Ok(tree)
                })
                .collect::<Result<Vec<_>>>()?;

            for (i, scores) in raw.iter_mut().enumerate() {
                for (score, tree) in scores.iter_mut().zip(&round) {
                    *score += self.learning_rate * tree.predict_row(x.row(i))?;
                }
            }
            self.estimators.push(round);

            if (iteration + 1) % 50 == 0 {
                debug!(iteration = iteration + 1, "gradient boosting progress");
            }
        }

        self.n_classes = Some(n_classes);
        self.n_features = n_features;
        Ok(())
    }

    fn predict_proba(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        if self.estimators.is_empty() {
            return Err(KoiError::NotFitted("GradientBoostingClassifier"));
        }
        check_width(self.n_features, x)?;

        let mut proba = Matrix::zeros(x.n_rows(), self.n_classes());
        for i in 0..x.n_rows() {
            proba.set_row(i, &softmax(&self.raw_scores(x.row(i))?));
        }
        Ok(proba)
    }

    fn n_classes(&self) -> usize {
        self.n_classes.unwrap_or(0)
    }
}
