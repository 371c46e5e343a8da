//! Early fusion baseline: one classifier over concatenated features

use crate::calibration::{ThresholdChoice, ThresholdSweep};
use crate::config::TrainerConfig;
use crate::error::{DepFusionError, Result};
use crate::training::unimodal::{TrainedModality, UnimodalTrainer};
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use tracing::info;

pub const EARLY_FUSION_NAME: &str = "early_fusion";

#[derive(Debug, Clone, Default)]
pub struct EarlyFusion {
    trainer: UnimodalTrainer,
}

impl EarlyFusion {
    pub fn new(config: TrainerConfig) -> Self {
        Self {
            trainer: UnimodalTrainer::new(config),
        }
    }

    /// Column-wise concatenation in text, audio, visual order
    pub fn concat(text: &Array2<f64>, audio: &Array2<f64>, visual: &Array2<f64>) -> Result<Array2<f64>> {
        let parts: [ArrayView2<f64>; 3] = [text.view(), audio.view(), visual.view()];
        concatenate(Axis(1), &parts).map_err(|e| DepFusionError::ShapeError {
            expected: format!("{} rows in every block", text.nrows()),
            actual: format!("{} ({}, {}, {})", e, text.nrows(), audio.nrows(), visual.nrows()),
        })
    }

    /// Train on concatenated training rows and calibrate on validation rows
    pub fn fit(
        &self,
        x_train: &Array2<f64>,
        y_train: &Array1<u8>,
        x_val: &Array2<f64>,
        y_val: &Array1<u8>,
        sweep: &ThresholdSweep,
        default_threshold: f64,
    ) -> Result<(TrainedModality, ThresholdChoice)> {
        info!(features = x_train.ncols(), "Training early fusion baseline");
        let mut trained = self
            .trainer
            .train(EARLY_FUSION_NAME, x_train, y_train, default_threshold)?;
        let choice = trained.model.calibrate(x_val, y_val, sweep, default_threshold)?;
        Ok((trained, choice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_concat_order() {
        let t = array![[1.0], [2.0]];
        let a = array![[3.0, 4.0], [5.0, 6.0]];
        let v = array![[7.0], [8.0]];
        let x = EarlyFusion::concat(&t, &a, &v).unwrap();
        assert_eq!(x, array![[1.0, 3.0, 4.0, 7.0], [2.0, 5.0, 6.0, 8.0]]);
    }

    #[test]
    fn test_concat_row_mismatch() {
        let t = array![[1.0], [2.0]];
        let a = array![[3.0]];
        assert!(EarlyFusion::concat(&t, &a, &t).is_err());
    }
}
