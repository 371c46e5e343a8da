//! Fusion of per-modality probabilities
//!
//! Three combiners share the same trained modality models:
//! - [`LateFusion`]: validation-AUC weighted average with a relevance bar
//! - [`StackingFusion`]: logistic meta-classifier over modality probabilities
//! - [`EarlyFusion`]: one classifier over concatenated features

mod early;
mod late;
mod stacking;

pub use early::{EarlyFusion, EARLY_FUSION_NAME};
pub use late::{LateFusion, LateFusionModel};
pub use stacking::{StackingFusion, StackingModel};

use crate::data::Modality;
use crate::error::{DepFusionError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-modality positive-class probabilities for one partition
pub type ProbabilityTable = BTreeMap<Modality, Array1<f64>>;

/// Stack a probability table into columns in [`Modality::ALL`] order
pub fn probability_matrix(table: &ProbabilityTable) -> Result<Array2<f64>> {
    let columns: Vec<&Array1<f64>> = Modality::ALL
        .iter()
        .map(|m| {
            table
                .get(m)
                .ok_or_else(|| DepFusionError::FeatureNotFound(format!("{} probabilities", m)))
        })
        .collect::<Result<_>>()?;
    let n = columns[0].len();
    if columns.iter().any(|c| c.len() != n) {
        return Err(DepFusionError::ShapeError {
            expected: format!("{} rows per modality", n),
            actual: format!("{:?}", columns.iter().map(|c| c.len()).collect::<Vec<_>>()),
        });
    }
    Ok(Array2::from_shape_fn((n, columns.len()), |(i, j)| columns[j][i]))
}

/// Non-negative modality weights summing to 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    weights: BTreeMap<Modality, f64>,
}

impl FusionWeights {
    /// Normalise raw non-negative weights to sum to 1
    pub fn normalized(raw: BTreeMap<Modality, f64>) -> Result<Self> {
        if raw.values().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(DepFusionError::ValidationError(format!(
                "Fusion weights must be finite and non-negative: {:?}",
                raw
            )));
        }
        let total: f64 = raw.values().sum();
        if total <= 0.0 {
            return Err(DepFusionError::ValidationError(
                "Fusion weights sum to zero".to_string(),
            ));
        }
        Ok(Self {
            weights: raw.into_iter().map(|(m, w)| (m, w / total)).collect(),
        })
    }

    /// Weight of a modality; modalities without an entry weigh 0
    pub fn get(&self, modality: Modality) -> f64 {
        self.weights.get(&modality).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Modality, f64)> + '_ {
        self.weights.iter().map(|(m, w)| (*m, *w))
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Weighted sum of the modalities' probabilities
    pub fn combine(&self, table: &ProbabilityTable) -> Result<Array1<f64>> {
        let n = table.values().next().map(|p| p.len()).unwrap_or(0);
        let mut combined = Array1::<f64>::zeros(n);
        for (modality, weight) in self.iter() {
            if weight == 0.0 {
                continue;
            }
            let proba = table
                .get(&modality)
                .ok_or_else(|| DepFusionError::FeatureNotFound(format!("{} probabilities", modality)))?;
            if proba.len() != n {
                return Err(DepFusionError::ShapeError {
                    expected: format!("{} rows", n),
                    actual: format!("{} rows for {}", proba.len(), modality),
                });
            }
            combined.scaled_add(weight, proba);
        }
        Ok(combined)
    }
}

/// Coarse risk band of a combined probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    /// `High` at 0.6 and above, `Moderate` at 0.4 and above, else `Low`
    pub fn from_probability(p: f64) -> Self {
        if p >= 0.6 {
            RiskTier::High
        } else if p >= 0.4 {
            RiskTier::Moderate
        } else {
            RiskTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::Moderate => "Moderate",
            RiskTier::High => "High",
        }
    }
}

/// Combined estimate for one subject
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub probability: f64,
    pub prediction: bool,
    pub risk_tier: RiskTier,
}

impl FusionResult {
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        Self {
            probability,
            prediction: probability >= threshold,
            risk_tier: RiskTier::from_probability(probability),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_normalized_weights_sum_to_one() {
        let raw = BTreeMap::from([(Modality::Text, 0.2), (Modality::Audio, 0.1), (Modality::Visual, 0.0)]);
        let w = FusionWeights::normalized(raw).unwrap();
        assert!((w.sum() - 1.0).abs() < 1e-12);
        assert!((w.get(Modality::Text) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(w.get(Modality::Visual), 0.0);
    }

    #[test]
    fn test_zero_total_rejected() {
        let raw = BTreeMap::from([(Modality::Text, 0.0)]);
        assert!(FusionWeights::normalized(raw).is_err());
    }

    #[test]
    fn test_combine_is_monotone_in_weighted_input() {
        let w = FusionWeights::normalized(BTreeMap::from([
            (Modality::Text, 0.5),
            (Modality::Audio, 0.3),
            (Modality::Visual, 0.2),
        ]))
        .unwrap();
        let mut table = ProbabilityTable::from([
            (Modality::Text, array![0.2, 0.2]),
            (Modality::Audio, array![0.4, 0.4]),
            (Modality::Visual, array![0.6, 0.6]),
        ]);
        let before = w.combine(&table).unwrap();
        table.insert(Modality::Audio, array![0.4, 0.9]);
        let after = w.combine(&table).unwrap();
        assert_eq!(before[0], after[0]);
        assert!(after[1] > before[1]);
        assert!((before[0] - (0.1 + 0.12 + 0.12)).abs() < 1e-12);
    }

    #[test]
    fn test_risk_tiers() {
        assert_eq!(RiskTier::from_probability(0.6), RiskTier::High);
        assert_eq!(RiskTier::from_probability(0.59), RiskTier::Moderate);
        assert_eq!(RiskTier::from_probability(0.4), RiskTier::Moderate);
        assert_eq!(RiskTier::from_probability(0.39), RiskTier::Low);
        let r = FusionResult::from_probability(0.5, 0.5);
        assert!(r.prediction);
    }

    #[test]
    fn test_probability_matrix_order() {
        let table = ProbabilityTable::from([
            (Modality::Visual, array![0.3]),
            (Modality::Text, array![0.1]),
            (Modality::Audio, array![0.2]),
        ]);
        assert_eq!(probability_matrix(&table).unwrap(), array![[0.1, 0.2, 0.3]]);
    }
}
