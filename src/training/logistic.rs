//! Penalised logistic regression for binary classification

use crate::error::{DepFusionError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Coefficient penalty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Penalty {
    /// Lasso, solved by accelerated proximal gradient
    L1,
    /// Ridge, solved by accelerated gradient descent
    L2,
}

/// Per-sample loss weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassWeight {
    /// Every sample weighs 1
    Uniform,
    /// Class c weighs n / (2 * n_c)
    Balanced,
}

/// Logistic regression with an unpenalised intercept
///
/// Minimises `(1/n) * sum(w_i * logloss_i) + penalty(beta) / (C * n)`, which
/// has the same minimiser as the usual `C * sum(w_i * logloss_i) + penalty`
/// form. The L2 penalty is `0.5 * ||beta||^2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    /// Inverse regularization strength
    pub c: f64,
    pub penalty: Penalty,
    pub class_weight: ClassWeight,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the largest parameter update
    pub tol: f64,
    /// Iterations used by the last fit
    pub n_iter: usize,
    /// Whether model is fitted
    pub is_fitted: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Create an L2 model with C = 1 and uniform weights
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            c: 1.0,
            penalty: Penalty::L2,
            class_weight: ClassWeight::Uniform,
            max_iter: 5000,
            tol: 1e-6,
            n_iter: 0,
            is_fitted: false,
        }
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_penalty(mut self, penalty: Penalty) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_class_weight(mut self, class_weight: ClassWeight) -> Self {
        self.class_weight = class_weight;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    fn sigmoid(z: f64) -> f64 {
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let e = z.exp();
            e / (1.0 + e)
        }
    }

    fn soft_threshold(v: f64, lambda: f64) -> f64 {
        if v > lambda {
            v - lambda
        } else if v < -lambda {
            v + lambda
        } else {
            0.0
        }
    }

    fn sample_weights(&self, y: &Array1<u8>) -> Result<Array1<f64>> {
        let n = y.len() as f64;
        let n_pos = y.iter().filter(|&&v| v == 1).count() as f64;
        let n_neg = n - n_pos;
        if n_pos == 0.0 || n_neg == 0.0 {
            return Err(DepFusionError::TrainingError(
                "Logistic regression needs both classes in the training labels".to_string(),
            ));
        }
        Ok(match self.class_weight {
            ClassWeight::Uniform => Array1::ones(y.len()),
            ClassWeight::Balanced => {
                let w_pos = n / (2.0 * n_pos);
                let w_neg = n / (2.0 * n_neg);
                y.mapv(|v| if v == 1 { w_pos } else { w_neg })
            }
        })
    }

    /// Fit the model
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(DepFusionError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if self.c <= 0.0 || !self.c.is_finite() {
            return Err(DepFusionError::InvalidParameter {
                name: "C".to_string(),
                value: self.c.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let weights = self.sample_weights(y)?;
        let target = y.mapv(|v| v as f64);
        let n = n_samples as f64;
        let lambda = 1.0 / (self.c * n);

        // Step from a Lipschitz bound on the smooth part: ||[X 1]||_F^2 * max_w / (4n)
        let max_w = weights.iter().cloned().fold(0.0, f64::max);
        let frob = x.iter().map(|v| v * v).sum::<f64>() + n;
        let mut lipschitz = max_w * frob / (4.0 * n);
        if self.penalty == Penalty::L2 {
            lipschitz += lambda;
        }
        let step = 1.0 / lipschitz.max(1e-12);

        let mut beta = Array1::<f64>::zeros(n_features);
        let mut bias = 0.0;
        let mut beta_m = beta.clone();
        let mut bias_m = bias;
        let mut t = 1.0f64;
        let mut converged_at = self.max_iter;

        for iter in 0..self.max_iter {
            // Gradient at the momentum point
            let linear = x.dot(&beta_m) + bias_m;
            let residual = Array1::from_shape_fn(n_samples, |i| {
                weights[i] * (Self::sigmoid(linear[i]) - target[i])
            });
            let mut grad = x.t().dot(&residual) / n;
            let grad_b = residual.sum() / n;
            if self.penalty == Penalty::L2 {
                grad.scaled_add(lambda, &beta_m);
            }

            let new_beta = match self.penalty {
                Penalty::L1 => Array1::from_shape_fn(n_features, |j| {
                    Self::soft_threshold(beta_m[j] - step * grad[j], step * lambda)
                }),
                Penalty::L2 => &beta_m - &grad.mapv(|g| g * step),
            };
            let new_bias = bias_m - step * grad_b;

            let delta = new_beta
                .iter()
                .zip(beta.iter())
                .map(|(a, b)| (a - b).abs())
                .fold((new_bias - bias).abs(), f64::max);

            let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            let momentum = (t - 1.0) / t_next;
            beta_m = &new_beta + &((&new_beta - &beta) * momentum);
            bias_m = new_bias + momentum * (new_bias - bias);
            beta = new_beta;
            bias = new_bias;
            t = t_next;

            if delta < self.tol {
                converged_at = iter + 1;
                break;
            }
        }

        if beta.iter().any(|v| !v.is_finite()) || !bias.is_finite() {
            return Err(DepFusionError::ComputationError(
                "Logistic regression diverged".to_string(),
            ));
        }
        if converged_at == self.max_iter {
            tracing::debug!(max_iter = self.max_iter, c = self.c, "Logistic solver hit the iteration cap");
        }

        self.coefficients = Some(beta);
        self.intercept = Some(bias);
        self.n_iter = converged_at;
        self.is_fitted = true;

        Ok(self)
    }

    /// Positive-class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (coefficients, intercept) = match (&self.coefficients, self.intercept) {
            (Some(c), Some(b)) if self.is_fitted => (c, b),
            _ => return Err(DepFusionError::ModelNotFitted),
        };
        if x.ncols() != coefficients.len() {
            return Err(DepFusionError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let linear = x.dot(coefficients) + intercept;
        Ok(linear.mapv(Self::sigmoid))
    }

    /// Class labels at the 0.5 decision rule
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| u8::from(p >= 0.5)))
    }

    pub fn n_features(&self) -> Option<usize> {
        self.coefficients.as_ref().map(|c| c.len())
    }

    /// Count of non-zero coefficients
    pub fn n_active(&self) -> usize {
        self.coefficients
            .as_ref()
            .map(|c| c.iter().filter(|v| **v != 0.0).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<u8>) {
        let x = array![
            [-2.0, 0.1],
            [-1.5, -0.2],
            [-1.0, 0.3],
            [-1.2, 0.0],
            [1.0, -0.1],
            [1.5, 0.2],
            [2.0, 0.0],
            [1.2, -0.3],
        ];
        let y = array![0, 0, 0, 0, 1, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_logistic_l2_separates() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new().with_c(1.0);
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&x).unwrap();
        assert_eq!(pred, y);
        let coef = model.coefficients.as_ref().unwrap();
        assert!(coef[0] > 0.0, "informative feature should have positive weight");
    }

    #[test]
    fn test_l1_strong_penalty_zeroes_coefficients() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new()
            .with_penalty(Penalty::L1)
            .with_c(0.001)
            .with_class_weight(ClassWeight::Balanced);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.n_active(), 0);
        let proba = model.predict_proba(&x).unwrap();
        // With balanced weights the intercept-only optimum is 0.5
        assert!(proba.iter().all(|p| (p - 0.5).abs() < 1e-3), "got {:?}", proba);
    }

    #[test]
    fn test_l1_keeps_informative_feature() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new()
            .with_penalty(Penalty::L1)
            .with_c(1.0)
            .with_class_weight(ClassWeight::Balanced);
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients.as_ref().unwrap();
        assert!(coef[0] > 0.0);
        assert!(coef[0].abs() > coef[1].abs());
    }

    #[test]
    fn test_balanced_weights_shift_minority_probability() {
        let x = array![[0.0], [0.1], [0.2], [0.3], [0.4], [0.5], [0.6], [0.7]];
        let y = array![0, 0, 0, 0, 0, 0, 1, 0];
        let mut plain = LogisticRegression::new();
        plain.fit(&x, &y).unwrap();
        let mut balanced = LogisticRegression::new().with_class_weight(ClassWeight::Balanced);
        balanced.fit(&x, &y).unwrap();

        let p_plain = plain.predict_proba(&x).unwrap();
        let p_bal = balanced.predict_proba(&x).unwrap();
        assert!(p_bal.mean().unwrap() > p_plain.mean().unwrap());
    }

    #[test]
    fn test_single_class_rejected() {
        let x = array![[0.0], [1.0]];
        let y = array![1, 1];
        assert!(LogisticRegression::new().fit(&x, &y).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LogisticRegression::new();
        assert!(matches!(
            model.predict_proba(&array![[1.0]]),
            Err(DepFusionError::ModelNotFitted)
        ));
    }
}
