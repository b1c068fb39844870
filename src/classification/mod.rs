//! Linear classification.
//!
//! Provides a multinomial logistic regression used as the meta-learner of the
//! stacking ensemble.
//!
//! # Example
//!
//! ```
//! use koi_classifier::classification::LogisticRegression;
//! use koi_classifier::prelude::*;
//!
//! let x = Matrix::from_vec(6, 1, vec![
//!     0.0, 0.1, 0.5, 0.6, 1.0, 1.1,
//! ]).expect("Matrix dimensions match data length");
//! let y = vec![0, 0, 1, 1, 2, 2];
//!
//! let mut model = LogisticRegression::new().with_c(100.0);
//! model.fit(&x, &y).expect("Training data is valid");
//! let proba = model.predict_proba(&x).expect("fitted");
//! assert_eq!(proba.shape(), (6, 3));
//! ```

use crate::error::{KoiError, Result};
use crate::primitives::Matrix;
use crate::traits::{
    check_labelled, check_width, ensure, resolve_n_classes, ProbabilisticClassifier,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Multinomial logistic regression with an L2 penalty.
///
/// Minimizes the mean cross-entropy plus `||W||² / (2·C·n)` over the weights
/// (intercepts are not penalized), which has the same minimizer as the
/// summed-loss formulation with inverse regularization strength `C`.
/// Optimization is full-batch gradient descent with a backtracking line
/// search, carried out in `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Weights, `n_classes x n_features`, row-major
    coefficients: Option<Vec<f32>>,
    /// One intercept per class
    intercepts: Vec<f32>,
    /// Inverse regularization strength
    c: f64,
    /// Maximum number of iterations
    max_iter: usize,
    /// Convergence tolerance on the largest gradient component
    tol: f64,
    n_classes: Option<usize>,
    n_features: usize,
    n_iter: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Creates a classifier with `C = 1.0`, `max_iter = 1000` and `tol = 1e-4`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercepts: Vec::new(),
            c: 1.0,
            max_iter: 1000,
            tol: 1e-4,
            n_classes: None,
            n_features: 0,
            n_iter: 0,
        }
    }

    /// Sets the inverse regularization strength.
    #[must_use]
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    /// Sets the maximum number of iterations.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Sets the convergence tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Fixes the number of classes instead of inferring it from labels.
    #[must_use]
    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = Some(n_classes);
        self
    }

    /// Fitted weights as an `n_classes x n_features` matrix.
    #[must_use]
    pub fn coefficients(&self) -> Option<Matrix<f32>> {
        let coef = self.coefficients.as_ref()?;
        Matrix::from_vec(self.intercepts.len(), self.n_features, coef.clone()).ok()
    }

    /// Fitted intercepts, one per class.
    #[must_use]
    pub fn intercepts(&self) -> &[f32] {
        &self.intercepts
    }

    /// Iterations used by the last fit.
    #[must_use]
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Feature count seen during `fit`.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Checks that the weights form an `n_classes x n_features` block of
    /// finite values with one intercept per class.
    ///
    /// # Errors
    ///
    /// `KoiError::NotFitted` without weights, `KoiError::Validation` for a
    /// shape disagreement or a non-finite parameter.
    pub fn check_fitted(&self) -> Result<()> {
        let coef = self
            .coefficients
            .as_ref()
            .ok_or(KoiError::NotFitted("LogisticRegression"))?;
        let n_classes = self.n_classes();
        ensure(n_classes > 0 && self.intercepts.len() == n_classes, || {
            format!(
                "{} intercepts for {n_classes} classes",
                self.intercepts.len()
            )
        })?;
        ensure(coef.len() == n_classes * self.n_features, || {
            format!(
                "{} coefficients for {n_classes} classes x {} features",
                coef.len(),
                self.n_features
            )
        })?;
        ensure(
            coef.iter().chain(&self.intercepts).all(|v| v.is_finite()),
            || "non-finite parameter".to_string(),
        )
    }

    fn validate(&self) -> Result<()> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(KoiError::invalid_hyperparameter("C", self.c, "> 0"));
        }
        if self.max_iter == 0 {
            return Err(KoiError::invalid_hyperparameter("max_iter", 0, ">= 1"));
        }
        if self.tol.is_nan() || self.tol < 0.0 {
            return Err(KoiError::invalid_hyperparameter("tol", self.tol, ">= 0"));
        }
        Ok(())
    }

    /// Class probabilities for one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not fitted or the row width differs.
    pub fn predict_proba_row(&self, row: &[f32]) -> Result<Vec<f32>> {
        let coef = self
            .coefficients
            .as_ref()
            .ok_or(KoiError::NotFitted("LogisticRegression"))?;
        if row.len() != self.n_features {
            return Err(KoiError::Validation(format!(
                "expected {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        let scores: Vec<f64> = self
            .intercepts
            .iter()
            .enumerate()
            .map(|(k, &b)| {
                let w = &coef[k * self.n_features..(k + 1) * self.n_features];
                f64::from(b)
                    + w.iter()
                        .zip(row)
                        .map(|(&w, &v)| f64::from(w) * f64::from(v))
                        .sum::<f64>()
            })
            .collect();
        Ok(softmax(&scores).into_iter().map(|p| p as f32).collect())
    }
}

/// Numerically stable softmax.
fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|&s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Training problem in `f64`.
///
/// Parameters are laid out per class as `[w_0 .. w_{d-1}, b]`.
struct Problem<'a> {
    x: &'a Matrix<f32>,
    y: &'a [usize],
    n_classes: usize,
    n_features: usize,
    penalty: f64,
}

impl Problem<'_> {
    fn stride(&self) -> usize {
        self.n_features + 1
    }

    fn scores(&self, params: &[f64], row: &[f32]) -> Vec<f64> {
        params
            .chunks(self.stride())
            .map(|p| {
                let (w, b) = p.split_at(self.n_features);
                b[0] + w
                    .iter()
                    .zip(row)
                    .map(|(&w, &v)| w * f64::from(v))
                    .sum::<f64>()
            })
            .collect()
    }

    fn regularization(&self, params: &[f64]) -> f64 {
        let squared: f64 = params
            .chunks(self.stride())
            .flat_map(|p| &p[..self.n_features])
            .map(|w| w * w)
            .sum();
        0.5 * self.penalty * squared
    }

    fn objective(&self, params: &[f64]) -> f64 {
        let n = self.x.n_rows();
        let mut loss = 0.0;
        for i in 0..n {
            let scores = self.scores(params, self.x.row(i));
            let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let log_sum = max + scores.iter().map(|s| (s - max).exp()).sum::<f64>().ln();
            loss += log_sum - scores[self.y[i]];
        }
        loss / n as f64 + self.regularization(params)
    }

    fn objective_and_gradient(&self, params: &[f64]) -> (f64, Vec<f64>) {
        let n = self.x.n_rows();
        let stride = self.stride();
        let mut grad = vec![0.0; params.len()];
        let mut loss = 0.0;

        for i in 0..n {
            let row = self.x.row(i);
            let scores = self.scores(params, row);
            let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let log_sum = max + scores.iter().map(|s| (s - max).exp()).sum::<f64>().ln();
            loss += log_sum - scores[self.y[i]];

            for (k, &s) in scores.iter().enumerate() {
                let mut residual = (s - log_sum).exp();
                if k == self.y[i] {
                    residual -= 1.0;
                }
                let g = &mut grad[k * stride..(k + 1) * stride];
                for (gj, &v) in g.iter_mut().zip(row) {
                    *gj += residual * f64::from(v);
                }
                g[self.n_features] += residual;
            }
        }

        let n = n as f64;
        for (k, g) in grad.chunks_mut(stride).enumerate() {
            let w = &params[k * stride..k * stride + self.n_features];
            for (gj, &wj) in g.iter_mut().zip(w) {
                *gj = *gj / n + self.penalty * wj;
            }
            g[self.n_features] /= n;
        }

        (loss / n + self.regularization(params), grad)
    }
}

impl ProbabilisticClassifier for LogisticRegression {
    fn fit(&mut self, x: &Matrix<f32>, y: &[usize]) -> Result<()> {
        check_labelled(x, y.len())?;
        self.validate()?;
        let n_classes = resolve_n_classes(self.n_classes, y)?;
        let (n_samples, n_features) = x.shape();

        let problem = Problem {
            x,
            y,
            n_classes,
            n_features,
            penalty: 1.0 / (self.c * n_samples as f64),
        };
        let mut params = vec![0.0f64; problem.n_classes * problem.stride()];
        let (mut value, mut grad) = problem.objective_and_gradient(&params);
        let mut step = 1.0f64;
        let mut iterations = 0;

        while iterations < self.max_iter {
            let largest = grad.iter().fold(0.0f64, |m, g| m.max(g.abs()));
            if largest <= self.tol {
                break;
            }
            iterations += 1;

            // Armijo backtracking.
            let grad_sq: f64 = grad.iter().map(|g| g * g).sum();
            let mut candidate;
            loop {
                candidate = params
                    .iter()
                    .zip(&grad)
                    .map(|(p, g)| p - step * g)
                    .collect::<Vec<_>>();
                if problem.objective(&candidate) <= value - 0.5 * step * grad_sq || step < 1e-12 {
                    break;
                }
                step *= 0.5;
            }

            params = candidate;
            let (next_value, next_grad) = problem.objective_and_gradient(&params);
            let improvement = value - next_value;
            value = next_value;
            grad = next_grad;
            if improvement <= f64::EPSILON * value.abs().max(1.0) {
                break;
            }
            step = (step * 2.0).min(1e3);
        }

        debug!(iterations, loss = value, "logistic regression fit finished");

        let stride = problem.stride();
        let mut coefficients = Vec::with_capacity(n_classes * n_features);
        let mut intercepts = Vec::with_capacity(n_classes);
        for p in params.chunks(stride) {
            coefficients.extend(p[..n_features].iter().map(|&w| w as f32));
            intercepts.push(p[n_features] as f32);
        }

        self.coefficients = Some(coefficients);
        self.intercepts = intercepts;
        self.n_classes = Some(n_classes);
        self.n_features = n_features;
        self.n_iter = iterations;
        Ok(())
    }

    fn predict_proba(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        if self.coefficients.is_none() {
            return Err(KoiError::NotFitted("LogisticRegression"));
        }
        check_width(self.n_features, x)?;
        let mut proba = Matrix::zeros(x.n_rows(), self.n_classes());
        for i in 0..x.n_rows() {
            proba.set_row(i, &self.predict_proba_row(x.row(i))?);
        }
        Ok(proba)
    }

    fn n_classes(&self) -> usize {
        self.n_classes.unwrap_or(0)
    }
}
