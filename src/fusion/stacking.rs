//! Stacking fusion: a logistic meta-classifier over modality probabilities

use super::{probability_matrix, ProbabilityTable};
use crate::calibration::{ThresholdChoice, ThresholdSweep};
use crate::data::Modality;
use crate::error::{DepFusionError, Result};
use crate::training::logistic::{ClassWeight, LogisticRegression, Penalty};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Fitted meta-classifier with its calibrated threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackingModel {
    /// Meta-feature column order
    pub modalities: Vec<Modality>,
    pub classifier: LogisticRegression,
    pub threshold: f64,
    pub trained_at: chrono::DateTime<chrono::Utc>,
}

impl StackingModel {
    pub fn artifact_path(dir: &Path) -> PathBuf {
        dir.join("stacking_fusion_model.json")
    }

    pub fn predict_proba(&self, table: &ProbabilityTable) -> Result<Array1<f64>> {
        self.classifier.predict_proba(&probability_matrix(table)?)
    }

    /// Meta-classifier coefficient of each modality
    pub fn coefficients(&self) -> Vec<(Modality, f64)> {
        match &self.classifier.coefficients {
            Some(coef) => self.modalities.iter().copied().zip(coef.iter().copied()).collect(),
            None => Vec::new(),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(Self::artifact_path(dir), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(Self::artifact_path(dir))?;
        let model: Self = serde_json::from_str(&raw)?;
        if !model.classifier.is_fitted {
            return Err(DepFusionError::ModelNotFitted);
        }
        Ok(model)
    }
}

/// Learns combination weights from training-partition probabilities
#[derive(Debug, Clone)]
pub struct StackingFusion {
    c: f64,
    max_iter: usize,
    tol: f64,
}

impl Default for StackingFusion {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 5000,
            tol: 1e-6,
        }
    }
}

impl StackingFusion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Fit on training meta-features, then sweep the threshold on validation
    pub fn fit(
        &self,
        train: &ProbabilityTable,
        y_train: &Array1<u8>,
        val: &ProbabilityTable,
        y_val: &Array1<u8>,
        sweep: &ThresholdSweep,
        default_threshold: f64,
    ) -> Result<(StackingModel, ThresholdChoice)> {
        let meta_train = probability_matrix(train)?;
        let mut classifier = LogisticRegression::new()
            .with_penalty(Penalty::L2)
            .with_class_weight(ClassWeight::Balanced)
            .with_c(self.c)
            .with_max_iter(self.max_iter)
            .with_tol(self.tol);
        classifier.fit(&meta_train, y_train)?;

        let mut model = StackingModel {
            modalities: Modality::ALL.to_vec(),
            classifier,
            threshold: default_threshold,
            trained_at: chrono::Utc::now(),
        };
        for (modality, coef) in model.coefficients() {
            info!(modality = %modality, coefficient = coef, "Stacking meta-coefficient");
        }

        let val_proba = model.predict_proba(val)?;
        let choice = sweep.select(y_val, &val_proba, default_threshold);
        model.threshold = choice.threshold;
        info!(
            threshold = choice.threshold,
            val_f1 = choice.f1,
            "Calibrated stacking threshold"
        );
        Ok((model, choice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn table(n: usize, offset: f64) -> (ProbabilityTable, Array1<u8>) {
        let y: Array1<u8> = Array1::from_shape_fn(n, |i| u8::from(i % 3 == 0));
        let text = y.mapv(|l| if l == 1 { 0.8 } else { 0.3 }) + offset;
        let audio = Array1::from_shape_fn(n, |i| 0.4 + 0.01 * (i % 5) as f64);
        let visual = y.mapv(|l| if l == 1 { 0.6 } else { 0.45 });
        (
            ProbabilityTable::from([
                (Modality::Text, text),
                (Modality::Audio, audio),
                (Modality::Visual, visual),
            ]),
            y,
        )
    }

    #[test]
    fn test_informative_modality_gets_positive_weight() {
        let (train, y_train) = table(30, 0.0);
        let (val, y_val) = table(12, 0.02);
        let (model, choice) = StackingFusion::new()
            .fit(&train, &y_train, &val, &y_val, &ThresholdSweep::default(), 0.5)
            .unwrap();

        let coef = model.coefficients();
        assert_eq!(coef.len(), 3);
        assert_eq!(coef[0].0, Modality::Text);
        assert!(coef[0].1 > 0.0);
        assert_eq!(choice.f1, 1.0);

        let proba = model.predict_proba(&val).unwrap();
        assert!(proba[0] > proba[1]);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (train, y_train) = table(30, 0.0);
        let (model, _) = StackingFusion::new()
            .fit(&train, &y_train, &train, &y_train, &ThresholdSweep::default(), 0.5)
            .unwrap();
        model.save(dir.path()).unwrap();
        let back = StackingModel::load(dir.path()).unwrap();
        let a = model.predict_proba(&train).unwrap();
        let b = back.predict_proba(&train).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_missing_modality_rejected() {
        let (mut train, y) = table(30, 0.0);
        train.remove(&Modality::Audio);
        let result = StackingFusion::new().fit(&train, &y, &train, &y, &ThresholdSweep::default(), 0.5);
        assert!(result.is_err());
    }
}
