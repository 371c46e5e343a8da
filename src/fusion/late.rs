//! AUC-weighted late fusion

use super::{FusionWeights, ProbabilityTable};
use crate::calibration::{ThresholdChoice, ThresholdSweep};
use crate::config::LateFusionConfig;
use crate::data::Modality;
use crate::error::{DepFusionError, Result};
use crate::evaluation::metrics::roc_auc_score;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Fitted late-fusion combiner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LateFusionModel {
    pub weights: FusionWeights,
    pub validation_auc: BTreeMap<Modality, f64>,
    pub threshold: f64,
    /// True when no modality cleared the relevance bar
    pub fallback: bool,
}

impl LateFusionModel {
    pub fn artifact_path(dir: &Path) -> PathBuf {
        dir.join("late_fusion_weights.json")
    }

    pub fn predict_proba(&self, table: &ProbabilityTable) -> Result<Array1<f64>> {
        self.weights.combine(table)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(Self::artifact_path(dir), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(Self::artifact_path(dir))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Weights each modality by how far its validation AUC clears chance
#[derive(Debug, Clone, Default)]
pub struct LateFusion {
    config: LateFusionConfig,
}

impl LateFusion {
    pub fn new(config: LateFusionConfig) -> Self {
        Self { config }
    }

    /// `max(auc - 0.5, floor)` per modality
    pub fn raw_weight(&self, auc: f64) -> f64 {
        (auc - 0.5).max(self.config.weight_floor)
    }

    /// Normalised weights over modalities clearing the relevance bar
    ///
    /// Modalities at or below the bar get weight 0. When none clears it,
    /// every modality keeps its raw weight. Returns the weights and whether
    /// the fallback was taken.
    pub fn compute_weights(&self, aucs: &BTreeMap<Modality, f64>) -> Result<(FusionWeights, bool)> {
        if aucs.is_empty() {
            return Err(DepFusionError::ValidationError(
                "Late fusion needs at least one modality".to_string(),
            ));
        }
        let relevant: BTreeMap<Modality, f64> = aucs
            .iter()
            .map(|(&m, &auc)| {
                let w = if auc > self.config.relevance_bar {
                    self.raw_weight(auc)
                } else {
                    0.0
                };
                (m, w)
            })
            .collect();

        if relevant.values().any(|&w| w > 0.0) {
            return Ok((FusionWeights::normalized(relevant)?, false));
        }

        warn!(
            bar = self.config.relevance_bar,
            "No modality cleared the relevance bar, using all raw weights"
        );
        let raw = aucs.iter().map(|(&m, &auc)| (m, self.raw_weight(auc))).collect();
        Ok((FusionWeights::normalized(raw)?, true))
    }

    /// Derive weights from validation AUCs and sweep the combined threshold
    pub fn fit(
        &self,
        val: &ProbabilityTable,
        y_val: &Array1<u8>,
        sweep: &ThresholdSweep,
        default_threshold: f64,
    ) -> Result<(LateFusionModel, ThresholdChoice)> {
        let mut validation_auc = BTreeMap::new();
        for (&modality, proba) in val {
            validation_auc.insert(modality, roc_auc_score(y_val, proba)?);
        }
        let (weights, fallback) = self.compute_weights(&validation_auc)?;
        for (modality, weight) in weights.iter() {
            info!(
                modality = %modality,
                val_auc = validation_auc[&modality],
                weight,
                "Late fusion weight"
            );
        }

        let combined = weights.combine(val)?;
        let choice = sweep.select(y_val, &combined, default_threshold);
        info!(
            threshold = choice.threshold,
            val_f1 = choice.f1,
            "Calibrated late fusion threshold"
        );

        Ok((
            LateFusionModel {
                weights,
                validation_auc,
                threshold: choice.threshold,
                fallback,
            },
            choice,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn aucs(t: f64, a: f64, v: f64) -> BTreeMap<Modality, f64> {
        BTreeMap::from([(Modality::Text, t), (Modality::Audio, a), (Modality::Visual, v)])
    }

    #[test]
    fn test_irrelevant_modality_gets_zero() {
        let fusion = LateFusion::default();
        let (w, fallback) = fusion.compute_weights(&aucs(0.80, 0.52, 0.60)).unwrap();
        assert!(!fallback);
        assert_eq!(w.get(Modality::Audio), 0.0);
        assert!((w.sum() - 1.0).abs() < 1e-12);
        assert!((w.get(Modality::Text) - 0.30 / 0.40).abs() < 1e-12);
        assert!((w.get(Modality::Visual) - 0.10 / 0.40).abs() < 1e-12);
    }

    #[test]
    fn test_fallback_uses_all_raw_weights() {
        let fusion = LateFusion::default();
        let (w, fallback) = fusion.compute_weights(&aucs(0.51, 0.40, 0.52)).unwrap();
        assert!(fallback);
        // raw weights 0.01, 0.01, 0.02
        assert!((w.get(Modality::Text) - 0.25).abs() < 1e-12);
        assert!((w.get(Modality::Audio) - 0.25).abs() < 1e-12);
        assert!((w.get(Modality::Visual) - 0.50).abs() < 1e-12);
        assert!(w.iter().all(|(_, x)| x >= 0.0));
    }

    #[test]
    fn test_fit_on_validation_probabilities() {
        let y = array![0u8, 0, 0, 1, 1, 1];
        let val = ProbabilityTable::from([
            (Modality::Text, array![0.1, 0.2, 0.3, 0.7, 0.8, 0.9]),
            (Modality::Audio, array![0.9, 0.1, 0.5, 0.4, 0.6, 0.2]),
            (Modality::Visual, array![0.2, 0.3, 0.6, 0.5, 0.7, 0.8]),
        ]);
        let (model, choice) = LateFusion::default()
            .fit(&val, &y, &ThresholdSweep::default(), 0.4)
            .unwrap();
        assert_eq!(model.validation_auc[&Modality::Text], 1.0);
        assert_eq!(model.weights.get(Modality::Audio), 0.0);
        assert!((model.weights.sum() - 1.0).abs() < 1e-12);
        assert_eq!(model.threshold, choice.threshold);
        assert_eq!(choice.f1, 1.0);
    }

    #[test]
    fn test_artifact_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (weights, fallback) = LateFusion::default().compute_weights(&aucs(0.7, 0.6, 0.55)).unwrap();
        let model = LateFusionModel {
            weights,
            validation_auc: aucs(0.7, 0.6, 0.55),
            threshold: 0.41,
            fallback,
        };
        model.save(dir.path()).unwrap();
        let back = LateFusionModel::load(dir.path()).unwrap();
        assert_eq!(back.weights, model.weights);
        assert_eq!(back.threshold, 0.41);
    }
}
