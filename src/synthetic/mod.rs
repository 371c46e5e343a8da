//! Synthetic minority oversampling
//!
//! Only used inside cross-validation folds; final models are fit on the
//! original rows.

mod smote;

pub use smote::Smote;

use crate::error::Result;
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

/// Result of resampling
#[derive(Debug, Clone)]
pub struct ResampleResult {
    /// Original rows followed by synthetic rows
    pub x: Array2<f64>,
    /// Labels aligned with `x`
    pub y: Array1<u8>,
    /// Number of synthetic samples generated per class, in class order
    pub n_synthetic: Vec<usize>,
}

/// Trait for samplers
pub trait Sampler: Send + Sync {
    /// Fit the sampler on data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<()>;

    /// Resample data
    fn resample(&self, x: &Array2<f64>, y: &Array1<u8>) -> Result<ResampleResult>;

    /// Fit and resample in one step
    fn fit_resample(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<ResampleResult> {
        self.fit(x, y)?;
        self.resample(x, y)
    }
}

/// Class distribution, ordered by class
pub fn class_counts(y: &Array1<u8>) -> BTreeMap<u8, usize> {
    let mut counts = BTreeMap::new();
    for &label in y.iter() {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Row indices for each class, ordered by class
pub fn class_indices(y: &Array1<u8>) -> BTreeMap<u8, Vec<usize>> {
    let mut indices = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        indices.entry(label).or_insert_with(Vec::new).push(i);
    }
    indices
}
