//! Random Forest classifier.

use super::builder::{presort, GrowthParams};
use super::DecisionTreeClassifier;
use crate::error::{KoiError, Result};
use crate::primitives::Matrix;
use crate::traits::{
    check_labelled, check_width, ensure, resolve_n_classes, ProbabilisticClassifier,
};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Number of features examined at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Every feature
    All,
    /// `floor(sqrt(n_features))`, at least 1
    Sqrt,
    /// `floor(log2(n_features))`, at least 1
    Log2,
    /// A fixed count, capped at `n_features`
    Count(usize),
}

impl MaxFeatures {
    /// Resolves to a concrete count for `n_features` inputs.
    #[must_use]
    pub fn resolve(self, n_features: usize) -> usize {
        let k = match self {
            Self::All => n_features,
            Self::Sqrt => (n_features as f64).sqrt() as usize,
            Self::Log2 => (n_features as f64).log2() as usize,
            Self::Count(k) => k,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Random Forest classifier.
///
/// Each tree is grown on a bootstrap sample, examining a random subset of
/// features at every split. Class probabilities are the mean of the trees'
/// leaf distributions. Trees are grown in parallel; with a `random_state`
/// tree `i` is seeded with `random_state + i`, so results are reproducible
/// regardless of thread count.
///
/// # Example
///
/// ```
/// use koi_classifier::prelude::*;
/// use koi_classifier::tree::RandomForestClassifier;
///
/// let x = Matrix::from_vec(8, 2, vec![
///     0.0, 0.1, 0.2, 0.0, 0.1, 0.3, 0.3, 0.2,
///     5.0, 5.1, 5.2, 5.0, 5.1, 5.3, 5.3, 5.2,
/// ]).expect("valid matrix");
/// let y = vec![0, 0, 0, 0, 1, 1, 1, 1];
///
/// let mut forest = RandomForestClassifier::new(20).with_random_state(42);
/// forest.fit(&x, &y).expect("fit");
/// assert_eq!(forest.predict(&x).expect("predict"), y);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    trees: Vec<DecisionTreeClassifier>,
    n_estimators: usize,
    max_depth: Option<usize>,
    min_samples_leaf: usize,
    max_features: MaxFeatures,
    random_state: Option<u64>,
    n_classes: Option<usize>,
    n_features: usize,
}

impl RandomForestClassifier {
    /// Creates a new Random Forest classifier.
    ///
    /// # Arguments
    ///
    /// * `n_estimators` - Number of trees in the forest
    #[must_use]
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            random_state: None,
            n_classes: None,
            n_features: 0,
        }
    }

    /// Sets the maximum depth for each tree.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Sets the minimum number of samples in each leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Sets how many features each split examines.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
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

    /// Number of fitted trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Feature count seen during `fit`.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Checks that every tree agrees with the forest's feature and class counts.
    ///
    /// # Errors
    ///
    /// `KoiError::NotFitted` for an empty forest, `KoiError::Validation` for a
    /// tree with a foreign shape or an out-of-range split.
    pub fn check_fitted(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(KoiError::NotFitted("RandomForestClassifier"));
        }
        let n_classes = self.n_classes();
        ensure(n_classes > 0, || "forest has no classes".to_string())?;
        for (i, tree) in self.trees.iter().enumerate() {
            tree.check_fitted(self.n_features, n_classes)
                .map_err(|e| e.within(format_args!("tree {i}")))?;
        }
        Ok(())
    }
}

/// Creates a bootstrap sample (random sample with replacement).
///
/// Returns indices of samples to include in the bootstrap sample.
fn bootstrap_sample(n_samples: usize, rng: &mut StdRng) -> Vec<usize> {
    let dist = Uniform::from(0..n_samples);
    (0..n_samples).map(|_| dist.sample(rng)).collect()
}

impl ProbabilisticClassifier for RandomForestClassifier {
    fn fit(&mut self, x: &Matrix<f32>, y: &[usize]) -> Result<()> {
        check_labelled(x, y.len())?;
        if self.n_estimators == 0 {
            return Err(KoiError::invalid_hyperparameter("n_estimators", 0, ">= 1"));
        }
        let n_classes = resolve_n_classes(self.n_classes, y)?;
        let (n_samples, n_features) = x.shape();
        let params = GrowthParams {
            max_depth: self.max_depth,
            min_samples_split: 2,
            min_samples_leaf: self.min_samples_leaf,
            max_features: Some(self.max_features.resolve(n_features)),
        };
        let presorted = presort(x);

        let trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|i| {
                let mut rng = match self.random_state {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
                    None => StdRng::from_entropy(),
                };
                let samples = bootstrap_sample(n_samples, &mut rng);
                let mut tree = DecisionTreeClassifier::new()
                    .with_params(params)
                    .with_n_classes(n_classes);
                tree.fit_samples(x, y, &samples, &presorted, Some(&mut rng))?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.n_classes = Some(n_classes);
        self.n_features = n_features;
        Ok(())
    }

    /// Returns the mean of the trees' leaf class distributions.
    fn predict_proba(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        if self.trees.is_empty() {
            return Err(KoiError::NotFitted("RandomForestClassifier"));
        }
        check_width(self.n_features, x)?;

        let n_classes = self.n_classes();
        let n_trees = self.trees.len() as f32;
        let mut proba = Matrix::zeros(x.n_rows(), n_classes);
        for i in 0..x.n_rows() {
            let mut sums = vec![0.0f32; n_classes];
            for tree in &self.trees {
                for (s, p) in sums.iter_mut().zip(tree.predict_proba_row(x.row(i))?) {
                    *s += p;
                }
            }
            for s in &mut sums {
                *s /= n_trees;
            }
            proba.set_row(i, &sums);
        }
        Ok(proba)
    }

    fn n_classes(&self) -> usize {
        self.n_classes.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::Sqrt.resolve(40), 6);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
        assert_eq!(MaxFeatures::Log2.resolve(40), 5);
        assert_eq!(MaxFeatures::All.resolve(7), 7);
        assert_eq!(MaxFeatures::Count(100).resolve(7), 7);
        assert_eq!(MaxFeatures::Count(0).resolve(7), 1);
    }

    #[test]
    fn test_bootstrap_sample_size_and_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let sample = bootstrap_sample(50, &mut rng);
        assert_eq!(sample.len(), 50);
        assert!(sample.iter().all(|&i| i < 50));
    }

    #[test]
    fn test_bootstrap_sample_reproducible() {
        let a = bootstrap_sample(30, &mut StdRng::seed_from_u64(42));
        let b = bootstrap_sample(30, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_estimators_rejected() {
        let x = Matrix::zeros(2, 1);
        let err = RandomForestClassifier::new(0).fit(&x, &[0, 1]).unwrap_err();
        assert!(matches!(err, KoiError::InvalidHyperparameter { .. }));
    }

    #[test]
    fn test_max_features_serde() {
        let json = serde_json::to_string(&MaxFeatures::Sqrt).expect("json");
        assert_eq!(json, "\"sqrt\"");
        let count: MaxFeatures = serde_json::from_str(r#"{"count":3}"#).expect("parse");
        assert_eq!(count, MaxFeatures::Count(3));
    }
}
