//! Decision threshold selection by F1 sweep
//!
//! One sweep is shared by unimodal calibration, late fusion and stacking so
//! all three break ties the same way.

use crate::config::ThresholdConfig;
use crate::evaluation::metrics::{apply_threshold, f1_score};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Outcome of a threshold sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdChoice {
    pub threshold: f64,
    /// Validation F1 at `threshold`; 0 when the default was kept
    pub f1: f64,
    /// False when no candidate beat F1 = 0 and the default was kept
    pub improved: bool,
}

/// Grid `start + i * step` for every `i` with the value below `stop`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdSweep {
    start: f64,
    stop: f64,
    step: f64,
}

impl Default for ThresholdSweep {
    fn default() -> Self {
        Self {
            start: 0.25,
            stop: 0.65,
            step: 0.01,
        }
    }
}

impl ThresholdSweep {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Self { start, stop, step }
    }

    pub fn from_config(config: &ThresholdConfig) -> Self {
        Self::new(config.start, config.stop, config.step)
    }

    pub fn candidates(&self) -> Vec<f64> {
        if self.step <= 0.0 || self.start >= self.stop {
            return Vec::new();
        }
        let n = ((self.stop - self.start) / self.step - 1e-9).ceil().max(0.0) as usize;
        (0..n).map(|i| self.start + i as f64 * self.step).collect()
    }

    /// Pick the candidate with the highest F1
    ///
    /// A candidate replaces the current best only when strictly better, and
    /// the search starts from F1 = 0 at `default`, so the lowest threshold
    /// wins ties and an all-zero sweep returns `default`.
    pub fn select(&self, y_true: &Array1<u8>, proba: &Array1<f64>, default: f64) -> ThresholdChoice {
        let mut best = ThresholdChoice {
            threshold: default,
            f1: 0.0,
            improved: false,
        };
        for t in self.candidates() {
            let f1 = f1_score(y_true, &apply_threshold(proba, t));
            if f1 > best.f1 {
                best = ThresholdChoice {
                    threshold: t,
                    f1,
                    improved: true,
                };
            }
        }
        best
    }
}
