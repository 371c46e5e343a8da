//! Per-modality training: standardize, search C by in-fold SMOTE
//! cross-validation, refit, calibrate.

use crate::calibration::{ThresholdChoice, ThresholdSweep};
use crate::config::TrainerConfig;
use crate::error::{DepFusionError, Result};
use crate::evaluation::metrics::{accuracy_score, apply_threshold, f1_score};
use crate::preprocessing::StandardScaler;
use crate::synthetic::{Sampler, Smote};
use crate::training::cross_validation::{CVResults, CVSplit, StratifiedKFold};
use crate::training::logistic::{ClassWeight, LogisticRegression, Penalty};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fitted {scaler, classifier, threshold} bundle for one modality
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalityModel {
    pub name: String,
    pub scaler: StandardScaler,
    pub classifier: LogisticRegression,
    pub threshold: f64,
}

/// On-disk form of the classifier half of the artifact pair
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassifierArtifact {
    name: String,
    classifier: LogisticRegression,
    threshold: f64,
    trained_at: chrono::DateTime<chrono::Utc>,
}

impl ModalityModel {
    pub fn n_features(&self) -> Option<usize> {
        self.classifier.n_features()
    }

    /// Positive-class probabilities for raw (unscaled) rows
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scaled = self.scaler.transform(x)?;
        self.classifier.predict_proba(&scaled)
    }

    /// Labels at the calibrated threshold
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>> {
        Ok(apply_threshold(&self.predict_proba(x)?, self.threshold))
    }

    /// Sweep the decision threshold on validation rows and keep the best
    pub fn calibrate(
        &mut self,
        x_val: &Array2<f64>,
        y_val: &Array1<u8>,
        sweep: &ThresholdSweep,
        default: f64,
    ) -> Result<ThresholdChoice> {
        let proba = self.predict_proba(x_val)?;
        let choice = sweep.select(y_val, &proba, default);
        self.threshold = choice.threshold;
        info!(
            modality = %self.name,
            threshold = choice.threshold,
            val_f1 = choice.f1,
            improved = choice.improved,
            "Calibrated decision threshold"
        );
        Ok(choice)
    }

    pub fn model_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}_model.json", name))
    }

    pub fn scaler_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}_scaler.json", name))
    }

    /// Write `{name}_model.json` and `{name}_scaler.json` under `dir`
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let artifact = ClassifierArtifact {
            name: self.name.clone(),
            classifier: self.classifier.clone(),
            threshold: self.threshold,
            trained_at: chrono::Utc::now(),
        };
        std::fs::write(
            Self::model_path(dir, &self.name),
            serde_json::to_string_pretty(&artifact)?,
        )?;
        std::fs::write(
            Self::scaler_path(dir, &self.name),
            serde_json::to_string_pretty(&self.scaler)?,
        )?;
        debug!(modality = %self.name, dir = %dir.display(), "Saved model artifacts");
        Ok(())
    }

    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let artifact: ClassifierArtifact =
            serde_json::from_str(&std::fs::read_to_string(Self::model_path(dir, name))?)?;
        let scaler: StandardScaler =
            serde_json::from_str(&std::fs::read_to_string(Self::scaler_path(dir, name))?)?;

        if !artifact.classifier.is_fitted || !scaler.is_fitted() {
            return Err(DepFusionError::ModelNotFitted);
        }
        if artifact.classifier.n_features() != scaler.n_features() {
            return Err(DepFusionError::ShapeError {
                expected: format!("scaler width {:?}", artifact.classifier.n_features()),
                actual: format!("scaler width {:?}", scaler.n_features()),
            });
        }
        Ok(Self {
            name: artifact.name,
            scaler,
            classifier: artifact.classifier,
            threshold: artifact.threshold,
        })
    }
}

/// Cross-validated score of one regularization strength
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub c: f64,
    pub f1: CVResults,
    pub accuracy: CVResults,
}

/// Regularization search record for one modality
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrengthSelection {
    /// Scores in candidate-grid order
    pub candidates: Vec<CandidateScore>,
    pub best_index: usize,
}

impl StrengthSelection {
    pub fn best(&self) -> &CandidateScore {
        &self.candidates[self.best_index]
    }

    /// First candidate with the highest mean CV F1
    pub fn from_candidates(candidates: Vec<CandidateScore>) -> Result<Self> {
        if candidates.is_empty() {
            return Err(DepFusionError::TrainingError(
                "No regularization candidates were scored".to_string(),
            ));
        }
        let mut best_index = 0;
        for (i, cand) in candidates.iter().enumerate().skip(1) {
            if cand.f1.mean_score > candidates[best_index].f1.mean_score {
                best_index = i;
            }
        }
        Ok(Self {
            candidates,
            best_index,
        })
    }
}

/// Trained modality plus its search record
#[derive(Debug, Clone)]
pub struct TrainedModality {
    pub model: ModalityModel,
    pub selection: StrengthSelection,
}

/// Unimodal trainer
#[derive(Debug, Clone, Default)]
pub struct UnimodalTrainer {
    config: TrainerConfig,
}

impl UnimodalTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    fn classifier(&self, c: f64) -> LogisticRegression {
        LogisticRegression::new()
            .with_penalty(Penalty::L1)
            .with_class_weight(ClassWeight::Balanced)
            .with_c(c)
            .with_max_iter(self.config.max_iter)
            .with_tol(self.config.tol)
    }

    /// Score one fold: scaler, SMOTE and classifier are all fit on the
    /// fold's training rows only
    fn score_fold(&self, x: &Array2<f64>, y: &Array1<u8>, split: &CVSplit, c: f64) -> Result<(f64, f64)> {
        let x_tr = x.select(Axis(0), &split.train_indices);
        let y_tr = y.select(Axis(0), &split.train_indices);
        let x_te = x.select(Axis(0), &split.test_indices);
        let y_te = y.select(Axis(0), &split.test_indices);

        let mut scaler = StandardScaler::new();
        let x_tr = scaler.fit_transform(&x_tr)?;
        let x_te = scaler.transform(&x_te)?;

        let mut smote = Smote::new()
            .with_k_neighbors(self.config.smote_k)
            .with_seed(self.config.seed);
        let resampled = smote.fit_resample(&x_tr, &y_tr).map_err(|e| {
            DepFusionError::TrainingError(format!("fold {}: {}", split.fold_idx, e))
        })?;

        let mut clf = self.classifier(c);
        clf.fit(&resampled.x, &resampled.y)?;
        let pred = clf.predict(&x_te)?;
        Ok((f1_score(&y_te, &pred), accuracy_score(&y_te, &pred)))
    }

    fn score_candidate(&self, x: &Array2<f64>, y: &Array1<u8>, splits: &[CVSplit], c: f64) -> Result<CandidateScore> {
        let mut f1s = Vec::with_capacity(splits.len());
        let mut accs = Vec::with_capacity(splits.len());
        for split in splits {
            let (f1, acc) = self.score_fold(x, y, split, c)?;
            f1s.push(f1);
            accs.push(acc);
        }
        Ok(CandidateScore {
            c,
            f1: CVResults::from_scores(f1s),
            accuracy: CVResults::from_scores(accs),
        })
    }

    /// Score every candidate strength on the same folds
    pub fn search(&self, x: &Array2<f64>, y: &Array1<u8>) -> Result<StrengthSelection> {
        let splits = StratifiedKFold::new(self.config.n_folds)
            .with_random_state(self.config.seed)
            .split(y)?;

        let scored: Vec<Result<CandidateScore>> = if self.config.parallel {
            self.config
                .c_grid
                .par_iter()
                .map(|&c| self.score_candidate(x, y, &splits, c))
                .collect()
        } else {
            self.config
                .c_grid
                .iter()
                .map(|&c| self.score_candidate(x, y, &splits, c))
                .collect()
        };
        let candidates = scored.into_iter().collect::<Result<Vec<_>>>()?;
        StrengthSelection::from_candidates(candidates)
    }

    /// Train one modality on its training rows
    ///
    /// The returned model carries `default_threshold` until calibrated.
    pub fn train(
        &self,
        name: &str,
        x_train: &Array2<f64>,
        y_train: &Array1<u8>,
        default_threshold: f64,
    ) -> Result<TrainedModality> {
        if x_train.nrows() != y_train.len() {
            return Err(DepFusionError::ShapeError {
                expected: format!("{} labels", x_train.nrows()),
                actual: format!("{} labels", y_train.len()),
            });
        }
        if x_train.ncols() == 0 {
            return Err(DepFusionError::TrainingError(format!(
                "{} has no feature columns",
                name
            )));
        }

        let mut scaler = StandardScaler::new();
        let x_std = scaler.fit_transform(x_train)?;

        let selection = self.search(&x_std, y_train)?;
        let best = selection.best();
        info!(
            modality = %name,
            best_c = best.c,
            cv_f1 = best.f1.mean_score,
            cv_f1_std = best.f1.std_score,
            cv_accuracy = best.accuracy.mean_score,
            "Selected regularization strength"
        );

        let mut classifier = self.classifier(best.c);
        classifier.fit(&x_std, y_train)?;
        debug!(
            modality = %name,
            active = classifier.n_active(),
            features = x_train.ncols(),
            iterations = classifier.n_iter,
            "Refit on full training partition"
        );

        Ok(TrainedModality {
            model: ModalityModel {
                name: name.to_string(),
                scaler,
                classifier,
                threshold: default_threshold,
            },
            selection,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Two informative columns plus noise; 20 positives, 40 negatives
    fn toy(seed: u64) -> (Array2<f64>, Array1<u8>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let n = 60;
        let y: Array1<u8> = Array1::from_shape_fn(n, |i| u8::from(i % 3 == 0));
        let x = Array2::from_shape_fn((n, 4), |(i, j)| {
            let shift = if y[i] == 1 && j < 2 { 1.5 } else { 0.0 };
            shift + rng.gen_range(-1.0..1.0)
        });
        (x, y)
    }

    fn fast_config() -> TrainerConfig {
        TrainerConfig {
            max_iter: 2000,
            ..TrainerConfig::default()
        }
    }

    #[test]
    fn test_selection_is_first_maximum() {
        let trainer = UnimodalTrainer::new(fast_config());
        let (x, y) = toy(1);
        let selection = trainer.search(&x, &y).unwrap();

        assert_eq!(selection.candidates.len(), 8);
        let best_f1 = selection.best().f1.mean_score;
        for (i, cand) in selection.candidates.iter().enumerate() {
            assert!(cand.f1.mean_score <= best_f1);
            if i < selection.best_index {
                assert!(cand.f1.mean_score < best_f1);
            }
        }
        assert!(TrainerConfig::default().c_grid.contains(&selection.best().c));
    }

    /// Fold F1 scores for one strength, rebuilt from the fold indices
    fn hand_fold_f1(x: &Array2<f64>, y: &Array1<u8>, config: &TrainerConfig, c: f64) -> Vec<f64> {
        let folds = StratifiedKFold::new(config.n_folds)
            .with_random_state(config.seed)
            .split(y)
            .unwrap();
        folds
            .iter()
            .map(|fold| {
                let y_fit = y.select(Axis(0), &fold.train_indices);
                let y_held = y.select(Axis(0), &fold.test_indices);

                let mut scaler = StandardScaler::new();
                let x_fit = scaler.fit_transform(&x.select(Axis(0), &fold.train_indices)).unwrap();
                let x_held = scaler.transform(&x.select(Axis(0), &fold.test_indices)).unwrap();

                let balanced = Smote::new()
                    .with_k_neighbors(3)
                    .with_seed(config.seed)
                    .fit_resample(&x_fit, &y_fit)
                    .unwrap();
                assert!(balanced.x.nrows() >= x_fit.nrows());

                let mut clf = LogisticRegression::new()
                    .with_penalty(Penalty::L1)
                    .with_class_weight(ClassWeight::Balanced)
                    .with_c(c)
                    .with_max_iter(config.max_iter)
                    .with_tol(config.tol);
                clf.fit(&balanced.x, &balanced.y).unwrap();
                let proba = clf.predict_proba(&x_held).unwrap();
                f1_score(&y_held, &apply_threshold(&proba, 0.5))
            })
            .collect()
    }

    fn first_max(means: &[f64]) -> usize {
        let mut best = 0;
        for (i, &m) in means.iter().enumerate() {
            if m > means[best] {
                best = i;
            }
        }
        best
    }

    #[test]
    fn test_search_matches_recomputed_cv() {
        let config = fast_config();
        assert_eq!(config.smote_k, 3);
        let (x, y) = toy(5);
        let selection = UnimodalTrainer::new(config.clone()).search(&x, &y).unwrap();

        let mut means = Vec::new();
        for (cand, &c) in selection.candidates.iter().zip(config.c_grid.iter()) {
            let expected = hand_fold_f1(&x, &y, &config, c);
            assert_eq!(cand.c, c);
            assert_eq!(cand.f1.scores, expected, "fold F1 at C = {}", c);
            let mean = expected.iter().sum::<f64>() / expected.len() as f64;
            assert!((cand.f1.mean_score - mean).abs() < 1e-12);
            means.push(mean);
        }
        assert_eq!(selection.best_index, first_max(&means));
    }

    #[test]
    fn test_tied_strengths_pick_first() {
        let config = TrainerConfig {
            c_grid: vec![0.01, 0.5, 0.5, 0.5],
            ..fast_config()
        };
        let (x, y) = toy(6);
        let selection = UnimodalTrainer::new(config.clone()).search(&x, &y).unwrap();

        let means: Vec<f64> = config
            .c_grid
            .iter()
            .map(|&c| {
                let f1 = hand_fold_f1(&x, &y, &config, c);
                f1.iter().sum::<f64>() / f1.len() as f64
            })
            .collect();
        assert_eq!(means[1], means[2]);
        assert_eq!(means[2], means[3]);
        assert_eq!(selection.best_index, first_max(&means));
        assert!(selection.best_index <= 1);

        let scored = |f1: f64| CandidateScore {
            c: f1,
            f1: CVResults::from_scores(vec![f1]),
            accuracy: CVResults::from_scores(vec![f1]),
        };
        let tie = StrengthSelection::from_candidates(vec![scored(0.6), scored(0.8), scored(0.8), scored(0.7)]).unwrap();
        assert_eq!(tie.best_index, 1);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (x, y) = toy(2);
        let par = UnimodalTrainer::new(fast_config()).search(&x, &y).unwrap();
        let seq = UnimodalTrainer::new(TrainerConfig { parallel: false, ..fast_config() })
            .search(&x, &y)
            .unwrap();
        assert_eq!(par.best_index, seq.best_index);
        for (a, b) in par.candidates.iter().zip(seq.candidates.iter()) {
            assert_eq!(a.f1.scores, b.f1.scores);
        }
    }

    #[test]
    fn test_train_learns_signal() {
        let trainer = UnimodalTrainer::new(fast_config());
        let (x, y) = toy(3);
        let trained = trainer.train("text", &x, &y, 0.5).unwrap();
        let proba = trained.model.predict_proba(&x).unwrap();

        let pos_mean = proba.iter().zip(y.iter()).filter(|&(_, &l)| l == 1).map(|(p, _)| *p).sum::<f64>() / 20.0;
        let neg_mean = proba.iter().zip(y.iter()).filter(|&(_, &l)| l == 0).map(|(p, _)| *p).sum::<f64>() / 40.0;
        assert!(pos_mean > neg_mean, "positives {} should outscore negatives {}", pos_mean, neg_mean);
        assert_eq!(trained.model.threshold, 0.5);
    }

    #[test]
    fn test_fold_without_enough_minority_fails() {
        let trainer = UnimodalTrainer::new(fast_config());
        let x = Array2::from_shape_fn((12, 2), |(i, j)| (i * 2 + j) as f64);
        let mut y = Array1::zeros(12);
        y[0] = 1;
        y[1] = 1;
        assert!(trainer.train("audio", &x, &y, 0.5).is_err());
    }

    #[test]
    fn test_artifact_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = UnimodalTrainer::new(fast_config());
        let (x, y) = toy(4);
        let mut model = trainer.train("visual", &x, &y, 0.5).unwrap().model;
        model.threshold = 0.37;
        model.save(dir.path()).unwrap();

        assert!(dir.path().join("visual_model.json").exists());
        assert!(dir.path().join("visual_scaler.json").exists());

        let loaded = ModalityModel::load(dir.path(), "visual").unwrap();
        let before = model.predict_proba(&x).unwrap();
        let after = loaded.predict_proba(&x).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(loaded.threshold, 0.37);
    }
}
