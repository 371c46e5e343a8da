//! PCA dimensionality reduction
//!
//! Fits on training rows only. Computes the top-k eigenvectors of the
//! covariance matrix using power iteration with deflation, then projects
//! every partition with the frozen basis.

use crate::config::ReductionConfig;
use crate::error::{DepFusionError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

const POWER_MAX_ITER: usize = 300;
const POWER_TOL: f64 = 1e-10;

/// Fitted linear projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaReducer {
    max_components: usize,
    seed: u64,
    mean: Option<Array1<f64>>,
    /// n_components x n_features, rows are unit eigenvectors
    components: Option<Array2<f64>>,
    explained_variance_ratio: Vec<f64>,
}

impl Default for PcaReducer {
    fn default() -> Self {
        Self::new(&ReductionConfig::default())
    }
}

impl PcaReducer {
    pub fn new(config: &ReductionConfig) -> Self {
        Self {
            max_components: config.max_components,
            seed: config.seed,
            mean: None,
            components: None,
            explained_variance_ratio: Vec::new(),
        }
    }

    /// `min(max_components, n_features, n_train - 1)`
    pub fn component_count(&self, n_train: usize, n_features: usize) -> usize {
        self.max_components
            .min(n_features)
            .min(n_train.saturating_sub(1))
    }

    pub fn components(&self) -> Option<&Array2<f64>> {
        self.components.as_ref()
    }

    pub fn n_components(&self) -> usize {
        self.components.as_ref().map(|c| c.nrows()).unwrap_or(0)
    }

    pub fn explained_variance_ratio(&self) -> &[f64] {
        &self.explained_variance_ratio
    }

    /// Fit on the given (training) rows
    pub fn fit(&mut self, x_train: &Array2<f64>) -> Result<&mut Self> {
        let (n, d) = x_train.dim();
        if n < 2 {
            return Err(DepFusionError::DataError(
                "PCA requires at least 2 training samples".to_string(),
            ));
        }
        if d == 0 {
            return Err(DepFusionError::DataError(
                "PCA requires at least 1 feature".to_string(),
            ));
        }
        let k = self.component_count(n, d);

        let mean = x_train
            .mean_axis(Axis(0))
            .ok_or_else(|| DepFusionError::ComputationError("column mean".to_string()))?;
        let centered = x_train - &mean.view().insert_axis(Axis(0));
        let cov = Self::covariance(&centered);

        let (eigenvalues, mut vectors) = self.power_iteration(&cov, k);

        // Largest-magnitude loading of each component is positive
        for mut row in vectors.rows_mut() {
            let pivot = row
                .iter()
                .copied()
                .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
            if pivot < 0.0 {
                row.mapv_inplace(|v| -v);
            }
        }

        let total_variance = cov.diag().sum().max(1e-12);
        self.explained_variance_ratio = eigenvalues
            .iter()
            .map(|&ev| (ev / total_variance).max(0.0))
            .collect();
        self.mean = Some(mean);
        self.components = Some(vectors);

        info!(
            features = d,
            components = k,
            explained = self.explained_variance_ratio.iter().sum::<f64>(),
            "Fitted PCA on training rows"
        );
        Ok(self)
    }

    /// Fit on `rows` of `x` only
    pub fn fit_rows(&mut self, x: &Array2<f64>, rows: &[usize]) -> Result<&mut Self> {
        let train = x.select(Axis(0), rows);
        self.fit(&train)
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (mean, components) = match (&self.mean, &self.components) {
            (Some(m), Some(c)) => (m, c),
            _ => return Err(DepFusionError::ModelNotFitted),
        };
        if x.ncols() != mean.len() {
            return Err(DepFusionError::ShapeError {
                expected: format!("{} features", mean.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let centered = x - &mean.view().insert_axis(Axis(0));
        Ok(centered.dot(&components.t()))
    }

    /// Sample covariance (n - 1 denominator)
    fn covariance(centered: &Array2<f64>) -> Array2<f64> {
        let (n, d) = centered.dim();
        let denom = (n as f64 - 1.0).max(1.0);
        let rows: Vec<Vec<f64>> = (0..d)
            .into_par_iter()
            .map(|i| {
                let ci = centered.column(i);
                (0..d).map(|j| ci.dot(&centered.column(j)) / denom).collect()
            })
            .collect();
        Array2::from_shape_fn((d, d), |(i, j)| rows[i][j])
    }

    /// Power iteration with deflation to extract top-k eigenvectors.
    fn power_iteration(&self, cov: &Array2<f64>, k: usize) -> (Vec<f64>, Array2<f64>) {
        let d = cov.nrows();
        let mut work = cov.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut eigenvalues = Vec::with_capacity(k);
        let mut vectors = Array2::zeros((k, d));

        for c in 0..k {
            let mut v: Array1<f64> = (0..d).map(|_| rng.gen_range(-1.0..1.0)).collect();
            Self::orthogonalize(&mut v, &vectors, c);
            let norm = v.dot(&v).sqrt().max(1e-12);
            v.mapv_inplace(|x| x / norm);

            let mut eigenvalue = 0.0f64;
            for _ in 0..POWER_MAX_ITER {
                let mut w = work.dot(&v);
                Self::orthogonalize(&mut w, &vectors, c);
                let new_eigenvalue = v.dot(&w);
                let w_norm = w.dot(&w).sqrt();
                if w_norm < 1e-12 {
                    // Remaining spectrum is numerically zero
                    eigenvalue = 0.0;
                    break;
                }
                let new_v = w / w_norm;
                let diff = (&new_v - &v).mapv(|x| x * x).sum().sqrt();
                v = new_v;
                eigenvalue = new_eigenvalue;
                if diff < POWER_TOL {
                    break;
                }
            }

            let eigenvalue = eigenvalue.max(0.0);
            eigenvalues.push(eigenvalue);
            vectors.row_mut(c).assign(&v);

            // Deflate: A = A - eigenvalue * v * v^T
            for i in 0..d {
                for j in 0..d {
                    work[[i, j]] -= eigenvalue * v[i] * v[j];
                }
            }
        }

        (eigenvalues, vectors)
    }

    /// Remove the projection of `v` onto the first `accepted` rows of `basis`
    fn orthogonalize(v: &mut Array1<f64>, basis: &Array2<f64>, accepted: usize) {
        for row in basis.rows().into_iter().take(accepted) {
            let proj = v.dot(&row);
            v.scaled_add(-proj, &row);
        }
    }
}
