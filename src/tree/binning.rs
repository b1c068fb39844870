//! Feature binning for histogram-based split search.
//!
//! Each feature is mapped to at most `max_bins` ordered bins. A split at bin
//! `b` sends every value `<= edges[b]` left, so the learned threshold is a
//! plain feature value and prediction never needs the binning again.

use crate::error::{KoiError, Result};
use crate::primitives::Matrix;

/// Largest supported bin count (codes are stored as `u8`).
pub const MAX_BINS: usize = 256;

/// Per-feature bin edges learned from training data.
#[derive(Debug, Clone, PartialEq)]
pub struct BinMapper {
    edges: Vec<Vec<f32>>,
}

impl BinMapper {
    /// Learns edges for every column.
    ///
    /// Columns with at most `max_bins` distinct values get one bin per value,
    /// split at midpoints; denser columns are cut at quantiles.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_bins` is outside `2..=256` or `x` is empty.
    pub fn fit(x: &Matrix<f32>, max_bins: usize) -> Result<Self> {
        if !(2..=MAX_BINS).contains(&max_bins) {
            return Err(KoiError::invalid_hyperparameter(
                "max_bins",
                max_bins,
                "a value in 2..=256",
            ));
        }
        if x.n_rows() == 0 {
            return Err(KoiError::empty_input("bin mapper"));
        }

        let edges = (0..x.n_cols())
            .map(|j| {
                let mut values = x.column(j).as_slice().to_vec();
                values.sort_by(f32::total_cmp);
                column_edges(&values, max_bins)
            })
            .collect();
        Ok(Self { edges })
    }

    /// Number of bins for a feature.
    #[must_use]
    pub fn n_bins(&self, feature: usize) -> usize {
        self.edges[feature].len() + 1
    }

    /// Upper edge of each bin but the last.
    #[must_use]
    pub fn edges(&self, feature: usize) -> &[f32] {
        &self.edges[feature]
    }

    /// Bin index of a value.
    #[must_use]
    pub fn bin(&self, feature: usize, value: f32) -> usize {
        self.edges[feature].partition_point(|&edge| edge < value)
    }

    /// Encodes a whole matrix.
    #[must_use]
    pub fn transform(&self, x: &Matrix<f32>) -> BinnedMatrix {
        let n_cols = x.n_cols();
        let mut codes = Vec::with_capacity(x.n_rows() * n_cols);
        for i in 0..x.n_rows() {
            for (j, &value) in x.row(i).iter().enumerate() {
                // bin() < MAX_BINS, so the code fits in a u8
                codes.push(self.bin(j, value) as u8);
            }
        }
        BinnedMatrix {
            codes,
            n_cols,
            edges: self.edges.clone(),
        }
    }
}

fn column_edges(sorted: &[f32], max_bins: usize) -> Vec<f32> {
    let mut distinct = sorted.to_vec();
    distinct.dedup();

    if distinct.len() <= max_bins {
        return distinct
            .windows(2)
            .map(|pair| {
                let mid = pair[0] + (pair[1] - pair[0]) / 2.0;
                if mid < pair[1] {
                    mid
                } else {
                    pair[0]
                }
            })
            .collect();
    }

    let n = sorted.len();
    let mut edges: Vec<f32> = (1..max_bins)
        .map(|k| sorted[(k * n / max_bins).min(n - 1)])
        .collect();
    edges.dedup();
    // A top edge equal to the maximum would leave the last bin empty.
    if edges.last() == sorted.last() {
        edges.pop();
    }
    edges
}

/// Bin codes for a training matrix, row-major.
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    codes: Vec<u8>,
    n_cols: usize,
    edges: Vec<Vec<f32>>,
}

impl BinnedMatrix {
    /// Bin of sample `row` for `feature`.
    #[must_use]
    pub fn code(&self, row: usize, feature: usize) -> usize {
        usize::from(self.codes[row * self.n_cols + feature])
    }

    /// Number of bins for a feature.
    #[must_use]
    pub fn n_bins(&self, feature: usize) -> usize {
        self.edges[feature].len() + 1
    }

    /// Threshold that sends bins `0..=bin` left.
    #[must_use]
    pub fn threshold(&self, feature: usize, bin: usize) -> f32 {
        self.edges[feature][bin]
    }
}
