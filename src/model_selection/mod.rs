//! Model selection utilities: stratified folds and stratified train/test splitting.
//!
//! Both splitters work on class-index labels and return sample indices, so the
//! caller decides how to gather rows.
//!
//! # Example
//!
//! ```
//! use koi_classifier::model_selection::{stratified_train_test_split, StratifiedKFold};
//!
//! let y = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
//! let (train, test) = stratified_train_test_split(&y, 0.2, 42).expect("valid split");
//! assert_eq!((train.len(), test.len()), (8, 2));
//!
//! let folds = StratifiedKFold::new(3).split(&y).expect("enough samples");
//! assert_eq!(folds.len(), 3);
//! ```

use crate::error::{KoiError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Train and test indices of one fold.
pub type FoldIndices = (Vec<usize>, Vec<usize>);

/// Stratified K-Fold cross-validator.
///
/// Folds are built without shuffling. Sorted labels are dealt round-robin to
/// decide how many samples of each class every fold receives; each class then
/// fills the folds in order of appearance. Per-class counts of any two folds
/// differ by at most one, and the split depends only on `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedKFold {
    n_splits: usize,
}

impl StratifiedKFold {
    /// Create a new Stratified K-Fold cross-validator.
    ///
    /// # Arguments
    ///
    /// * `n_splits` - Number of folds. Must be at least 2.
    #[must_use]
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    /// Number of folds.
    #[must_use]
    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Generate stratified train/test indices for each fold.
    ///
    /// Test indices of the folds partition `0..y.len()`; both index lists of a
    /// fold are ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if `n_splits < 2` or exceeds the number of samples.
    pub fn split(&self, y: &[usize]) -> Result<Vec<FoldIndices>> {
        if self.n_splits < 2 {
            return Err(KoiError::invalid_hyperparameter(
                "n_splits",
                self.n_splits,
                ">= 2",
            ));
        }
        if self.n_splits > y.len() {
            return Err(KoiError::Validation(format!(
                "cannot split {} samples into {} folds",
                y.len(),
                self.n_splits
            )));
        }

        let by_class = group_by_class(y);

        // allocation[class][fold]
        let mut sorted: Vec<usize> = y.to_vec();
        sorted.sort_unstable();
        let mut allocation: BTreeMap<usize, Vec<usize>> = by_class
            .keys()
            .map(|&class| (class, vec![0; self.n_splits]))
            .collect();
        for (position, class) in sorted.iter().enumerate() {
            if let Some(counts) = allocation.get_mut(class) {
                counts[position % self.n_splits] += 1;
            }
        }

        let mut fold_of = vec![0usize; y.len()];
        for (class, members) in &by_class {
            let mut members = members.iter();
            if let Some(counts) = allocation.get(class) {
                for (fold, &count) in counts.iter().enumerate() {
                    for &idx in members.by_ref().take(count) {
                        fold_of[idx] = fold;
                    }
                }
            }
        }

        Ok((0..self.n_splits)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..y.len()).partition(|&i| fold_of[i] == fold);
                (train, test)
            })
            .collect())
    }
}

/// Sample indices grouped by class, in order of appearance.
fn group_by_class(y: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        groups.entry(label).or_default().push(i);
    }
    groups
}

/// Splits sample indices into stratified train and test sets.
///
/// The test set holds `ceil(test_size * n)` samples. Each class contributes
/// its proportional share, rounded down, and the leftover slots go to the
/// classes with the largest remainders (lowest class first on ties). Members
/// are drawn after shuffling each class with a `StdRng` seeded from
/// `random_state`, so the split is reproducible. Both returned lists are
/// ascending.
///
/// # Errors
///
/// Returns an error if `test_size` is outside `(0, 1)`, `y` is empty, or
/// either side of the split would be empty.
pub fn stratified_train_test_split(
    y: &[usize],
    test_size: f64,
    random_state: u64,
) -> Result<FoldIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(KoiError::invalid_hyperparameter(
            "test_size",
            test_size,
            "in (0, 1)",
        ));
    }
    let n_samples = y.len();
    if n_samples == 0 {
        return Err(KoiError::empty_input("stratified split"));
    }
    let n_test = (test_size * n_samples as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(KoiError::Validation(format!(
            "test_size {test_size} leaves an empty side for {n_samples} samples"
        )));
    }

    let by_class = group_by_class(y);
    let ratio = n_test as f64 / n_samples as f64;

    let mut quota: Vec<(usize, usize, f64)> = by_class
        .iter()
        .map(|(&class, members)| {
            let exact = members.len() as f64 * ratio;
            (class, exact.floor() as usize, exact - exact.floor())
        })
        .collect();
    let assigned: usize = quota.iter().map(|q| q.1).sum();
    let mut order: Vec<usize> = (0..quota.len()).collect();
    order.sort_by(|&a, &b| quota[b].2.total_cmp(&quota[a].2).then(a.cmp(&b)));
    for &i in order.iter().cycle().take(n_test.saturating_sub(assigned)) {
        quota[i].1 += 1;
    }

    let mut rng = StdRng::seed_from_u64(random_state);
    let mut test = Vec::with_capacity(n_test);
    let mut train = Vec::with_capacity(n_samples - n_test);
    for (class, take, _) in quota {
        let mut members = by_class.get(&class).cloned().unwrap_or_default();
        members.shuffle(&mut rng);
        let take = take.min(members.len());
        test.extend_from_slice(&members[..take]);
        train.extend_from_slice(&members[take..]);
    }
    test.sort_unstable();
    train.sort_unstable();
    Ok((train, test))
}
