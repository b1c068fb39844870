//! Decision tree algorithms and ensemble methods.
//!
//! This module implements:
//! - CART classification trees (Gini impurity) with class-distribution leaves
//! - CART regression trees (squared error), exact or histogram splits
//! - Random Forest classifier (bootstrap + per-split feature subsampling)
//! - Multiclass Gradient Boosting classifier (softmax, one regression tree per
//!   class and round)
//!
//! # Example
//!
//! ```rust
//! use koi_classifier::prelude::*;
//! use koi_classifier::tree::DecisionTreeClassifier;
//!
//! let x = Matrix::from_vec(6, 1, vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0])
//!     .expect("valid matrix");
//! let y = vec![0, 0, 0, 2, 2, 2];
//!
//! let mut tree = DecisionTreeClassifier::new().with_max_depth(3).with_n_classes(3);
//! tree.fit(&x, &y).expect("fit should succeed");
//!
//! let proba = tree.predict_proba(&x).expect("predict_proba");
//! assert_eq!(proba.shape(), (6, 3));
//! assert_eq!(tree.predict(&x).expect("predict"), y);
//! ```

mod binning;
mod builder;
mod gradient_boosting;
mod random_forest;

pub use binning::{BinMapper, BinnedMatrix};
pub use builder::GrowthParams;
pub use gradient_boosting::GradientBoostingClassifier;
pub use random_forest::{MaxFeatures, RandomForestClassifier};

use crate::error::{KoiError, Result};
use crate::primitives::Matrix;
use crate::traits::{
    check_labelled, check_width, ensure, resolve_n_classes, ProbabilisticClassifier,
};
use builder::{presort, Gini, Grower, SplitStrategy, SquaredError};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Internal node in a decision tree.
///
/// Contains a split condition (feature and threshold) and pointers to
/// left and right subtrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node<L> {
    /// Index of the feature to split on
    pub feature_idx: usize,
    /// Threshold value for the split
    pub threshold: f32,
    /// Left subtree (samples where feature <= threshold)
    pub left: Box<TreeNode<L>>,
    /// Right subtree (samples where feature > threshold)
    pub right: Box<TreeNode<L>>,
}

/// A node in a decision tree (either internal node or leaf).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode<L> {
    /// Internal decision node with split condition
    Node(Node<L>),
    /// Leaf node with its payload
    Leaf(L),
}

impl<L> TreeNode<L> {
    /// Returns the depth of the tree rooted at this node.
    ///
    /// Leaf nodes have depth 0, internal nodes have depth 1 + max(left, right).
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::Node(node) => 1 + node.left.depth().max(node.right.depth()),
        }
    }

    /// Number of leaves below this node.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Node(node) => node.left.n_leaves() + node.right.n_leaves(),
        }
    }

    /// Checks that every split reads a feature below `n_features` and that
    /// `leaf_ok` accepts every leaf.
    ///
    /// # Errors
    ///
    /// Returns `KoiError::Validation` describing the first offending node.
    pub fn check_structure<F: Fn(&L) -> bool>(
        &self,
        n_features: usize,
        leaf_ok: &F,
    ) -> Result<()> {
        match self {
            Self::Leaf(leaf) => ensure(leaf_ok(leaf), || "malformed leaf".to_string()),
            Self::Node(node) => {
                ensure(node.feature_idx < n_features, || {
                    format!(
                        "split on feature {} but the tree has {n_features} features",
                        node.feature_idx
                    )
                })?;
                node.left.check_structure(n_features, leaf_ok)?;
                node.right.check_structure(n_features, leaf_ok)
            }
        }
    }

    /// Follows splits down to the leaf a sample lands in.
    #[must_use]
    pub fn leaf(&self, row: &[f32]) -> &L {
        let mut current = self;
        loop {
            match current {
                Self::Leaf(leaf) => return leaf,
                Self::Node(node) => {
                    current = if row[node.feature_idx] <= node.threshold {
                        &node.left
                    } else {
                        &node.right
                    };
                }
            }
        }
    }
}

/// Leaf of a classification tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassLeaf {
    /// Fraction of the leaf's training samples in each class
    pub distribution: Vec<f32>,
    /// Number of training samples in this leaf
    pub n_samples: usize,
}

impl ClassLeaf {
    fn from_samples(labels: &[usize], samples: &[usize], n_classes: usize) -> Self {
        let mut counts = vec![0usize; n_classes];
        for &i in samples {
            counts[labels[i]] += 1;
        }
        let n = samples.len().max(1) as f32;
        Self {
            distribution: counts.iter().map(|&c| c as f32 / n).collect(),
            n_samples: samples.len(),
        }
    }

    /// Majority class, lowest index on ties.
    #[must_use]
    pub fn class_label(&self) -> usize {
        crate::traits::argmax(&self.distribution)
    }
}

/// Leaf of a regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionLeaf {
    /// Predicted value for this leaf
    pub value: f32,
    /// Number of training samples in this leaf
    pub n_samples: usize,
}

fn validate_growth(params: &GrowthParams) -> Result<()> {
    if params.min_samples_split < 2 {
        return Err(KoiError::invalid_hyperparameter(
            "min_samples_split",
            params.min_samples_split,
            ">= 2",
        ));
    }
    if params.min_samples_leaf < 1 {
        return Err(KoiError::invalid_hyperparameter(
            "min_samples_leaf",
            params.min_samples_leaf,
            ">= 1",
        ));
    }
    if params.max_features == Some(0) {
        return Err(KoiError::invalid_hyperparameter("max_features", 0, ">= 1"));
    }
    Ok(())
}

/// CART classifier using Gini impurity.
///
/// Leaves keep the class distribution of their training samples, which is
/// what `predict_proba` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    tree: Option<TreeNode<ClassLeaf>>,
    params: GrowthParams,
    n_classes: Option<usize>,
    n_features: usize,
}

impl Default for DecisionTreeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTreeClassifier {
    /// Creates an unlimited-depth tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: None,
            params: GrowthParams::default(),
            n_classes: None,
            n_features: 0,
        }
    }

    /// Sets the maximum depth of the tree.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.params.max_depth = Some(depth);
        self
    }

    /// Sets the minimum number of samples required to split a node.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.params.min_samples_split = min_samples;
        self
    }

    /// Sets the minimum number of samples in each leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.params.min_samples_leaf = min_samples;
        self
    }

    /// Fixes the number of classes instead of inferring it from labels.
    #[must_use]
    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = Some(n_classes);
        self
    }

    pub(in crate::tree) fn with_params(mut self, params: GrowthParams) -> Self {
        self.params = params;
        self
    }

    /// The fitted tree, if any.
    #[must_use]
    pub fn tree(&self) -> Option<&TreeNode<ClassLeaf>> {
        self.tree.as_ref()
    }

    /// Fits on a subset of rows (repeats allowed) without copying `x`.
    pub(in crate::tree) fn fit_samples(
        &mut self,
        x: &Matrix<f32>,
        y: &[usize],
        samples: &[usize],
        presorted: &[Vec<usize>],
        rng: Option<&mut StdRng>,
    ) -> Result<()> {
        validate_growth(&self.params)?;
        let n_classes = resolve_n_classes(self.n_classes, y)?;
        let criterion = Gini {
            labels: y,
            n_classes,
        };
        let grower = Grower {
            x,
            criterion: &criterion,
            params: self.params,
            strategy: SplitStrategy::Exact { presorted },
            make_leaf: |leaf_samples: &[usize]| ClassLeaf::from_samples(y, leaf_samples, n_classes),
            rng,
        };
        self.tree = Some(grower.grow(samples));
        self.n_classes = Some(n_classes);
        self.n_features = x.n_cols();
        Ok(())
    }

    /// Checks a fitted (or deserialized) tree against the shape its owner expects.
    pub(crate) fn check_fitted(&self, n_features: usize, n_classes: usize) -> Result<()> {
        let tree = self
            .tree
            .as_ref()
            .ok_or(KoiError::NotFitted("DecisionTreeClassifier"))?;
        ensure(
            self.n_features == n_features && self.n_classes() == n_classes,
            || {
                format!(
                    "tree fitted on {} features and {} classes, \
                     expected {n_features} and {n_classes}",
                    self.n_features,
                    self.n_classes()
                )
            },
        )?;
        tree.check_structure(n_features, &|leaf: &ClassLeaf| {
            leaf.distribution.len() == n_classes
        })
    }

    /// Class distribution of the leaf a single row lands in.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree is not fitted.
    pub fn predict_proba_row(&self, row: &[f32]) -> Result<&[f32]> {
        let tree = self
            .tree
            .as_ref()
            .ok_or(KoiError::NotFitted("DecisionTreeClassifier"))?;
        Ok(&tree.leaf(row).distribution)
    }
}

impl ProbabilisticClassifier for DecisionTreeClassifier {
    fn fit(&mut self, x: &Matrix<f32>, y: &[usize]) -> Result<()> {
        check_labelled(x, y.len())?;
        let samples: Vec<usize> = (0..x.n_rows()).collect();
        let presorted = presort(x);
        self.fit_samples(x, y, &samples, &presorted, None)
    }

    fn predict_proba(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let tree = self
            .tree
            .as_ref()
            .ok_or(KoiError::NotFitted("DecisionTreeClassifier"))?;
        check_width(self.n_features, x)?;

        let n_classes = self.n_classes();
        let mut data = Vec::with_capacity(x.n_rows() * n_classes);
        for i in 0..x.n_rows() {
            data.extend_from_slice(&tree.leaf(x.row(i)).distribution);
        }
        Ok(Matrix::from_vec(x.n_rows(), n_classes, data)?)
    }

    fn n_classes(&self) -> usize {
        self.n_classes.unwrap_or(0)
    }
}

/// CART regressor minimising squared error.
///
/// Supports exact or histogram split search; gradient boosting fits these to
/// pseudo-residuals and may replace leaf means with Newton steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    tree: Option<TreeNode<RegressionLeaf>>,
    params: GrowthParams,
    n_features: usize,
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTreeRegressor {
    /// Creates an unlimited-depth regression tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: None,
            params: GrowthParams::default(),
            n_features: 0,
        }
    }

    /// Sets the maximum depth of the tree.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.params.max_depth = Some(depth);
        self
    }

    /// Sets the minimum number of samples in each leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.params.min_samples_leaf = min_samples;
        self
    }

    pub(in crate::tree) fn with_params(mut self, params: GrowthParams) -> Self {
        self.params = params;
        self
    }

    /// The fitted tree, if any.
    #[must_use]
    pub fn tree(&self) -> Option<&TreeNode<RegressionLeaf>> {
        self.tree.as_ref()
    }

    /// Fits to continuous targets with exact splits, leaves holding the mean.
    ///
    /// # Errors
    ///
    /// Returns an error on empty input or mismatched lengths.
    pub fn fit(&mut self, x: &Matrix<f32>, y: &[f32]) -> Result<()> {
        check_labelled(x, y.len())?;
        let samples: Vec<usize> = (0..x.n_rows()).collect();
        let presorted = presort(x);
        self.fit_gradient(x, y, None, &samples, SplitStrategy::Exact { presorted: &presorted })
    }

    /// Fits to `targets` over `samples`. With `hessians`, each leaf holds
    /// `sum(target) / sum(hessian)`; otherwise the mean target.
    pub(in crate::tree) fn fit_gradient(
        &mut self,
        x: &Matrix<f32>,
        targets: &[f32],
        hessians: Option<&[f32]>,
        samples: &[usize],
        strategy: SplitStrategy<'_>,
    ) -> Result<()> {
        validate_growth(&self.params)?;
        let criterion = SquaredError { targets };
        let grower = Grower {
            x,
            criterion: &criterion,
            params: self.params,
            strategy,
            make_leaf: |leaf_samples: &[usize]| RegressionLeaf {
                value: leaf_value(targets, hessians, leaf_samples),
                n_samples: leaf_samples.len(),
            },
            rng: None,
        };
        self.tree = Some(grower.grow(samples));
        self.n_features = x.n_cols();
        Ok(())
    }

    pub(crate) fn check_fitted(&self, n_features: usize) -> Result<()> {
        let tree = self
            .tree
            .as_ref()
            .ok_or(KoiError::NotFitted("DecisionTreeRegressor"))?;
        ensure(self.n_features == n_features, || {
            format!(
                "tree fitted on {} features, expected {n_features}",
                self.n_features
            )
        })?;
        tree.check_structure(n_features, &|_: &RegressionLeaf| true)
    }

    /// Prediction for a single row.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree is not fitted.
    pub fn predict_row(&self, row: &[f32]) -> Result<f32> {
        let tree = self
            .tree
            .as_ref()
            .ok_or(KoiError::NotFitted("DecisionTreeRegressor"))?;
        Ok(tree.leaf(row).value)
    }

    /// Predictions for every row.
    ///
    /// # Errors
    ///
    /// Returns an error if not fitted or the feature count differs.
    pub fn predict(&self, x: &Matrix<f32>) -> Result<Vec<f32>> {
        check_width(self.n_features, x)?;
        (0..x.n_rows()).map(|i| self.predict_row(x.row(i))).collect()
    }
}

fn leaf_value(targets: &[f32], hessians: Option<&[f32]>, samples: &[usize]) -> f32 {
    let numerator: f64 = samples.iter().map(|&i| f64::from(targets[i])).sum();
    let denominator: f64 = match hessians {
        Some(h) => samples.iter().map(|&i| f64::from(h[i])).sum(),
        None => samples.len() as f64,
    };
    if denominator.abs() < 1e-150 {
        0.0
    } else {
        (numerator / denominator) as f32
    }
}
