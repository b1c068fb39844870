//! Core compute primitives (Vector, Matrix).
//!
//! These types carry feature data through preprocessing and every learner.

mod matrix;
mod vector;

pub use matrix::Matrix;
pub use vector::Vector;
