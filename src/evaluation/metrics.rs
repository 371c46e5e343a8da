//! Binary classification metrics
//!
//! Precision, recall and F1 follow the zero-division-is-zero convention.
//! AUC is the Mann-Whitney rank statistic with average ranks for ties.

use crate::error::{DepFusionError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// 2x2 confusion counts, positive class = 1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
    pub tp: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &Array1<u8>, y_pred: &Array1<u8>) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t, p) {
                (1, 1) => cm.tp += 1,
                (1, _) => cm.fn_ += 1,
                (_, 1) => cm.fp += 1,
                _ => cm.tn += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }

    /// Rows are true class, columns predicted class
    pub fn as_rows(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Hard labels from probabilities, positive when `p >= threshold`
pub fn apply_threshold(proba: &Array1<f64>, threshold: f64) -> Array1<u8> {
    proba.mapv(|p| u8::from(p >= threshold))
}

pub fn f1_score(y_true: &Array1<u8>, y_pred: &Array1<u8>) -> f64 {
    ConfusionMatrix::from_predictions(y_true, y_pred).f1()
}

pub fn accuracy_score(y_true: &Array1<u8>, y_pred: &Array1<u8>) -> f64 {
    ConfusionMatrix::from_predictions(y_true, y_pred).accuracy()
}

/// Area under the ROC curve
pub fn roc_auc_score(y_true: &Array1<u8>, scores: &Array1<f64>) -> Result<f64> {
    if y_true.len() != scores.len() {
        return Err(DepFusionError::ShapeError {
            expected: format!("{} scores", y_true.len()),
            actual: format!("{} scores", scores.len()),
        });
    }
    let n_pos = y_true.iter().filter(|&&v| v == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(DepFusionError::ValidationError(
            "ROC AUC is undefined when only one class is present".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Average ranks over tied runs (1-based)
    let mut ranks = vec![0.0f64; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = y_true
        .iter()
        .zip(ranks.iter())
        .filter(|&(&t, _)| t == 1)
        .map(|(_, &r)| r)
        .sum();
    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// ROC curve points `(fpr, tpr)` at every distinct score, highest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

pub fn roc_curve(y_true: &Array1<u8>, scores: &Array1<f64>) -> RocCurve {
    let n_pos = y_true.iter().filter(|&&v| v == 1).count();
    let n_neg = y_true.len() - n_pos;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    let mut thresholds = vec![f64::INFINITY];
    let (mut tp, mut fp) = (0usize, 0usize);
    for (k, &idx) in order.iter().enumerate() {
        if y_true[idx] == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_run = k + 1 == order.len() || scores[order[k + 1]] != scores[idx];
        if last_of_run {
            fpr.push(ratio(fp, n_neg));
            tpr.push(ratio(tp, n_pos));
            thresholds.push(scores[idx]);
        }
    }

    RocCurve { fpr, tpr, thresholds }
}

/// Test-set metrics for one model variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
    pub auc: f64,
    pub confusion: ConfusionMatrix,
}

impl ClassificationReport {
    pub fn compute(y_true: &Array1<u8>, proba: &Array1<f64>, threshold: f64) -> Result<Self> {
        let y_pred = apply_threshold(proba, threshold);
        let confusion = ConfusionMatrix::from_predictions(y_true, &y_pred);
        Ok(Self {
            accuracy: confusion.accuracy(),
            f1: confusion.f1(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            auc: roc_auc_score(y_true, proba)?,
            confusion,
        })
    }
}
