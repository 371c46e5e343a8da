//! Pipeline configuration
//!
//! Every tunable of the batch pipeline lives here. Defaults reproduce the
//! reference run; a JSON file and a handful of environment variables can
//! override them.

use crate::error::{DepFusionError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Stratified three-way split settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of all participants held out for test
    pub test_fraction: f64,
    /// Fraction of all participants used for validation
    pub val_fraction: f64,
    /// Seed for both stages of the split
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.15,
            val_fraction: 0.15,
            seed: 42,
        }
    }
}

/// Dimensionality reduction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReductionConfig {
    /// Upper bound on retained components
    pub max_components: usize,
    /// Power iteration seed
    pub seed: u64,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            max_components: 20,
            seed: 42,
        }
    }
}

/// Unimodal trainer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Candidate inverse regularization strengths, searched in order
    pub c_grid: Vec<f64>,
    /// Number of stratified folds
    pub n_folds: usize,
    /// SMOTE neighbour count inside each fold
    pub smote_k: usize,
    /// Seed for fold shuffling and oversampling
    pub seed: u64,
    /// Solver iteration cap
    pub max_iter: usize,
    /// Solver tolerance on the parameter update
    pub tol: f64,
    /// Evaluate candidate strengths on the rayon pool
    pub parallel: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            c_grid: vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0],
            n_folds: 5,
            smote_k: 3,
            seed: 42,
            max_iter: 5000,
            tol: 1e-6,
            parallel: true,
        }
    }
}

/// Decision threshold sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// First candidate threshold
    pub start: f64,
    /// Exclusive upper bound of the sweep
    pub stop: f64,
    /// Grid step
    pub step: f64,
    /// Fallback for unimodal and early-fusion models
    pub unimodal_default: f64,
    /// Fallback for the late-fusion combined score
    pub late_fusion_default: f64,
    /// Fallback for the stacking meta-classifier
    pub stacking_default: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            start: 0.25,
            stop: 0.65,
            step: 0.01,
            unimodal_default: 0.50,
            late_fusion_default: 0.40,
            stacking_default: 0.50,
        }
    }
}

/// Late fusion weighting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LateFusionConfig {
    /// Validation AUC a modality must exceed to be included
    pub relevance_bar: f64,
    /// Minimum raw weight before normalisation
    pub weight_floor: f64,
}

impl Default for LateFusionConfig {
    fn default() -> Self {
        Self {
            relevance_bar: 0.52,
            weight_floor: 0.01,
        }
    }
}

/// Top-level batch pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding master_labels.csv and the three feature tables
    pub features_dir: PathBuf,
    /// Output directory for model artifacts
    pub models_dir: PathBuf,
    /// Output directory for metrics and chart data
    pub results_dir: PathBuf,
    /// Write reduced audio/visual matrices next to the feature tables
    pub persist_reduced: bool,
    pub split: SplitConfig,
    pub reduction: ReductionConfig,
    pub trainer: TrainerConfig,
    pub threshold: ThresholdConfig,
    pub late_fusion: LateFusionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            features_dir: PathBuf::from("data/features"),
            models_dir: PathBuf::from("models"),
            results_dir: PathBuf::from("results"),
            persist_reduced: true,
            split: SplitConfig::default(),
            reduction: ReductionConfig::default(),
            trainer: TrainerConfig::default(),
            threshold: ThresholdConfig::default(),
            late_fusion: LateFusionConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config.with_env_overrides())
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `DEPFUSION_*` environment variables on top of this config
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("DEPFUSION_FEATURES_DIR") {
            self.features_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("DEPFUSION_MODELS_DIR") {
            self.models_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("DEPFUSION_RESULTS_DIR") {
            self.results_dir = PathBuf::from(dir);
        }
        if let Some(seed) = std::env::var("DEPFUSION_SEED")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.split.seed = seed;
            self.trainer.seed = seed;
            self.reduction.seed = seed;
        }
        self
    }

    pub fn with_features_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.features_dir = dir.into();
        self
    }

    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = dir.into();
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn with_persist_reduced(mut self, persist: bool) -> Self {
        self.persist_reduced = persist;
        self
    }

    pub fn with_trainer(mut self, trainer: TrainerConfig) -> Self {
        self.trainer = trainer;
        self
    }

    /// Reject settings that cannot produce a valid run
    pub fn validate(&self) -> Result<()> {
        let s = &self.split;
        if s.test_fraction <= 0.0 || s.val_fraction <= 0.0 || s.test_fraction + s.val_fraction >= 1.0 {
            return Err(DepFusionError::InvalidParameter {
                name: "split".to_string(),
                value: format!("test={}, val={}", s.test_fraction, s.val_fraction),
                reason: "fractions must be positive and sum below 1".to_string(),
            });
        }
        if self.trainer.c_grid.is_empty() || self.trainer.c_grid.iter().any(|&c| c <= 0.0) {
            return Err(DepFusionError::InvalidParameter {
                name: "trainer.c_grid".to_string(),
                value: format!("{:?}", self.trainer.c_grid),
                reason: "need at least one strictly positive strength".to_string(),
            });
        }
        if self.trainer.n_folds < 2 {
            return Err(DepFusionError::InvalidParameter {
                name: "trainer.n_folds".to_string(),
                value: self.trainer.n_folds.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        let t = &self.threshold;
        if t.step <= 0.0 || t.start >= t.stop {
            return Err(DepFusionError::InvalidParameter {
                name: "threshold".to_string(),
                value: format!("[{}, {}) step {}", t.start, t.stop, t.step),
                reason: "empty sweep".to_string(),
            });
        }
        Ok(())
    }
}
