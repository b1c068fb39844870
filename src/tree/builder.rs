//! Recursive CART growth shared by the classification and regression trees.
//!
//! Exact mode keeps one sample list per feature, sorted by that feature, and
//! partitions the lists stably at every split so no node ever re-sorts.
//! Histogram mode scans per-node bin histograms instead.

use super::binning::BinnedMatrix;
use super::{Node, TreeNode};
use crate::primitives::Matrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Relative cost decrease a split must achieve.
const MIN_COST_DECREASE: f64 = 1e-9;

/// Stopping rules for tree growth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthParams {
    /// Maximum depth (`None` grows until leaves are pure)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples in each child
    pub min_samples_leaf: usize,
    /// Non-constant features examined per split (`None` = all)
    pub max_features: Option<usize>,
}

impl Default for GrowthParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

/// Node statistics and the additive cost derived from them.
///
/// `cost` must be additive over children and lower for purer nodes.
pub(super) trait Criterion: Sync {
    type Stats: Clone;

    fn zero(&self) -> Self::Stats;
    fn push(&self, stats: &mut Self::Stats, sample: usize);
    fn merge(&self, stats: &mut Self::Stats, other: &Self::Stats);
    fn count(&self, stats: &Self::Stats) -> usize;
    fn cost(&self, stats: &Self::Stats) -> f64;
    /// Cost of `left` plus the cost of `total - left`.
    fn split_cost(&self, total: &Self::Stats, left: &Self::Stats) -> f64;
}

/// Gini impurity weighted by node size: `n - sum(c^2) / n`.
pub(super) struct Gini<'a> {
    pub labels: &'a [usize],
    pub n_classes: usize,
}

#[derive(Clone)]
pub(super) struct ClassCounts {
    pub counts: Vec<usize>,
    pub n: usize,
}

fn gini_cost(sum_sq: f64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        n as f64 - sum_sq / n as f64
    }
}

impl Criterion for Gini<'_> {
    type Stats = ClassCounts;

    fn zero(&self) -> ClassCounts {
        ClassCounts {
            counts: vec![0; self.n_classes],
            n: 0,
        }
    }

    fn push(&self, stats: &mut ClassCounts, sample: usize) {
        stats.counts[self.labels[sample]] += 1;
        stats.n += 1;
    }

    fn merge(&self, stats: &mut ClassCounts, other: &ClassCounts) {
        for (c, o) in stats.counts.iter_mut().zip(&other.counts) {
            *c += o;
        }
        stats.n += other.n;
    }

    fn count(&self, stats: &ClassCounts) -> usize {
        stats.n
    }

    fn cost(&self, stats: &ClassCounts) -> f64 {
        let sum_sq: f64 = stats.counts.iter().map(|&c| (c * c) as f64).sum();
        gini_cost(sum_sq, stats.n)
    }

    fn split_cost(&self, total: &ClassCounts, left: &ClassCounts) -> f64 {
        let (mut left_sq, mut right_sq) = (0.0, 0.0);
        for (&t, &l) in total.counts.iter().zip(&left.counts) {
            left_sq += (l * l) as f64;
            right_sq += ((t - l) * (t - l)) as f64;
        }
        gini_cost(left_sq, left.n) + gini_cost(right_sq, total.n - left.n)
    }
}

/// Sum of squared errors, up to a constant: `-sum^2 / n`.
pub(super) struct SquaredError<'a> {
    pub targets: &'a [f32],
}

#[derive(Clone, Copy)]
pub(super) struct SumCount {
    pub sum: f64,
    pub n: usize,
}

fn sse_cost(sum: f64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        -(sum * sum) / n as f64
    }
}

impl Criterion for SquaredError<'_> {
    type Stats = SumCount;

    fn zero(&self) -> SumCount {
        SumCount { sum: 0.0, n: 0 }
    }

    fn push(&self, stats: &mut SumCount, sample: usize) {
        stats.sum += f64::from(self.targets[sample]);
        stats.n += 1;
    }

    fn merge(&self, stats: &mut SumCount, other: &SumCount) {
        stats.sum += other.sum;
        stats.n += other.n;
    }

    fn count(&self, stats: &SumCount) -> usize {
        stats.n
    }

    fn cost(&self, stats: &SumCount) -> f64 {
        sse_cost(stats.sum, stats.n)
    }

    fn split_cost(&self, total: &SumCount, left: &SumCount) -> f64 {
        sse_cost(left.sum, left.n) + sse_cost(total.sum - left.sum, total.n - left.n)
    }
}

/// How candidate thresholds are enumerated.
pub(super) enum SplitStrategy<'a> {
    /// Every midpoint between consecutive distinct values.
    Exact {
        /// All row indices sorted by each feature, computed once per fit.
        presorted: &'a [Vec<usize>],
    },
    /// Bin boundaries of a pre-binned matrix.
    Histogram(&'a BinnedMatrix),
}

/// Sorts all row indices by each feature.
pub(super) fn presort(x: &Matrix<f32>) -> Vec<Vec<usize>> {
    (0..x.n_cols())
        .map(|j| {
            let mut order: Vec<usize> = (0..x.n_rows()).collect();
            order.sort_by(|&a, &b| x.get(a, j).total_cmp(&x.get(b, j)));
            order
        })
        .collect()
}

enum NodeSamples {
    /// One copy of the node's samples per feature, each sorted by that feature.
    Sorted(Vec<Vec<usize>>),
    Plain(Vec<usize>),
}

impl NodeSamples {
    fn samples(&self) -> &[usize] {
        match self {
            Self::Sorted(lists) => &lists[0],
            Self::Plain(samples) => samples,
        }
    }
}

struct Split {
    feature: usize,
    threshold: f32,
    cost: f64,
}

/// Grows one tree. `make_leaf` turns the samples reaching a leaf into its payload.
pub(super) struct Grower<'a, C, F> {
    pub x: &'a Matrix<f32>,
    pub criterion: &'a C,
    pub params: GrowthParams,
    pub strategy: SplitStrategy<'a>,
    pub make_leaf: F,
    pub rng: Option<&'a mut StdRng>,
}

impl<'a, C, L, F> Grower<'a, C, F>
where
    C: Criterion,
    F: FnMut(&[usize]) -> L,
{
    /// Grows a tree over `samples` (row indices, repeats allowed).
    pub fn grow(mut self, samples: &[usize]) -> TreeNode<L> {
        let root = match self.strategy {
            SplitStrategy::Exact { presorted } => {
                let mut multiplicity = vec![0usize; self.x.n_rows()];
                for &i in samples {
                    multiplicity[i] += 1;
                }
                NodeSamples::Sorted(
                    presorted
                        .iter()
                        .map(|order| {
                            order
                                .iter()
                                .flat_map(|&i| std::iter::repeat(i).take(multiplicity[i]))
                                .collect()
                        })
                        .collect(),
                )
            }
            SplitStrategy::Histogram(_) => NodeSamples::Plain(samples.to_vec()),
        };
        self.grow_node(root, 0)
    }

    fn grow_node(&mut self, node: NodeSamples, depth: usize) -> TreeNode<L> {
        let samples = node.samples();
        let n = samples.len();
        let mut total = self.criterion.zero();
        for &i in samples {
            self.criterion.push(&mut total, i);
        }

        let params = self.params;
        let depth_reached = params.max_depth.is_some_and(|d| depth >= d);
        if depth_reached || n < params.min_samples_split || n < 2 * params.min_samples_leaf {
            return TreeNode::Leaf((self.make_leaf)(samples));
        }

        let node_cost = self.criterion.cost(&total);
        let required = node_cost - MIN_COST_DECREASE * node_cost.abs().max(1.0);
        match self.best_split(&node, &total) {
            Some(split) if split.cost < required => {
                let (left, right) = partition(self.x, node, split.feature, split.threshold);
                TreeNode::Node(Node {
                    feature_idx: split.feature,
                    threshold: split.threshold,
                    left: Box::new(self.grow_node(left, depth + 1)),
                    right: Box::new(self.grow_node(right, depth + 1)),
                })
            }
            _ => TreeNode::Leaf((self.make_leaf)(samples)),
        }
    }

    fn best_split(&mut self, node: &NodeSamples, total: &C::Stats) -> Option<Split> {
        let n_features = self.x.n_cols();
        let mut features: Vec<usize> = (0..n_features).collect();
        let budget = match (self.params.max_features, self.rng.as_deref_mut()) {
            (Some(k), Some(rng)) if k < n_features => {
                features.shuffle(rng);
                k
            }
            _ => n_features,
        };

        let mut best: Option<Split> = None;
        let mut visited = 0;
        for feature in features {
            if visited == budget {
                break;
            }
            let candidate = match (node, &self.strategy) {
                (NodeSamples::Sorted(lists), _) => self.exact_split(&lists[feature], feature, total),
                (NodeSamples::Plain(samples), SplitStrategy::Histogram(binned)) => {
                    self.histogram_split(binned, samples, feature, total)
                }
                (NodeSamples::Plain(_), SplitStrategy::Exact { .. }) => None,
            };
            // Constant features don't count against the budget.
            let Some(found) = candidate else { continue };
            visited += 1;
            if let Some(split) = found {
                if best.as_ref().map_or(true, |b| split.cost < b.cost) {
                    best = Some(split);
                }
            }
        }
        best
    }

    /// `None` if the feature is constant in the node, `Some(None)` if no
    /// threshold satisfies the leaf-size rule.
    fn exact_split(&self, order: &[usize], feature: usize, total: &C::Stats) -> Option<Option<Split>> {
        let x = self.x;
        let n = order.len();
        let first = x.get(order[0], feature);
        let last = x.get(order[n - 1], feature);
        if first >= last {
            return None;
        }

        let min_leaf = self.params.min_samples_leaf;
        let mut left = self.criterion.zero();
        let mut best: Option<Split> = None;
        for pos in 0..n - 1 {
            self.criterion.push(&mut left, order[pos]);
            let value = x.get(order[pos], feature);
            let next = x.get(order[pos + 1], feature);
            let n_left = pos + 1;
            if next <= value || n_left < min_leaf || n - n_left < min_leaf {
                continue;
            }
            let cost = self.criterion.split_cost(total, &left);
            if best.as_ref().map_or(true, |b| cost < b.cost) {
                best = Some(Split {
                    feature,
                    threshold: midpoint(value, next),
                    cost,
                });
            }
        }
        Some(best)
    }

    fn histogram_split(
        &self,
        binned: &BinnedMatrix,
        samples: &[usize],
        feature: usize,
        total: &C::Stats,
    ) -> Option<Option<Split>> {
        let n_bins = binned.n_bins(feature);
        let mut hist = vec![self.criterion.zero(); n_bins];
        for &i in samples {
            self.criterion.push(&mut hist[binned.code(i, feature)], i);
        }
        let occupied = hist.iter().filter(|h| self.criterion.count(h) > 0).count();
        if occupied < 2 {
            return None;
        }

        let n = samples.len();
        let min_leaf = self.params.min_samples_leaf;
        let mut left = self.criterion.zero();
        let mut best: Option<Split> = None;
        for (bin, stats) in hist.iter().enumerate().take(n_bins - 1) {
            self.criterion.merge(&mut left, stats);
            let n_left = self.criterion.count(&left);
            if self.criterion.count(stats) == 0 || n_left < min_leaf || n - n_left < min_leaf {
                continue;
            }
            let cost = self.criterion.split_cost(total, &left);
            if best.as_ref().map_or(true, |b| cost < b.cost) {
                best = Some(Split {
                    feature,
                    threshold: binned.threshold(feature, bin),
                    cost,
                });
            }
        }
        Some(best)
    }
}

/// Threshold strictly between two distinct values, never equal to the upper one.
fn midpoint(low: f32, high: f32) -> f32 {
    let mid = low + (high - low) / 2.0;
    if mid >= high || !mid.is_finite() {
        low
    } else {
        mid
    }
}

fn partition(
    x: &Matrix<f32>,
    node: NodeSamples,
    feature: usize,
    threshold: f32,
) -> (NodeSamples, NodeSamples) {
    let split = |list: Vec<usize>| -> (Vec<usize>, Vec<usize>) {
        list.into_iter()
            .partition(|&i| x.get(i, feature) <= threshold)
    };
    match node {
        NodeSamples::Sorted(lists) => {
            let (left, right): (Vec<_>, Vec<_>) = lists.into_iter().map(split).unzip();
            (NodeSamples::Sorted(left), NodeSamples::Sorted(right))
        }
        NodeSamples::Plain(samples) => {
            let (left, right) = split(samples);
            (NodeSamples::Plain(left), NodeSamples::Plain(right))
        }
    }
}
