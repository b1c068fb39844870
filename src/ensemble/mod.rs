//! Stacking ensemble.
//!
//! Layer 1 is a set of named probabilistic base learners; layer 2 is a
//! multinomial logistic regression trained on their out-of-fold class
//! probabilities.

mod stacking;

pub use stacking::{BaseLearner, NamedEstimator, StackingBuilder, StackingClassifier};

#[cfg(test)]
#[path = "stacking_tests.rs"]
mod tests;
