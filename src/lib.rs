//! depfusion - multimodal depression-risk fusion
//!
//! Turns three independently trained and calibrated per-modality
//! classifiers (interview text, speech descriptors, facial behaviour) into a
//! combined risk estimate, with every fitted transform restricted to the
//! training partition.
//!
//! # Modules
//!
//! ## Data
//! - [`data`] - Label tables, feature tables, participant-aligned merge
//! - [`extract`] - Raw recordings to per-participant feature tables
//! - [`split`] - Stratified train/validation/test assignment
//!
//! ## Modelling
//! - [`reduction`] - PCA fit on training rows only
//! - [`preprocessing`] - Feature standardization
//! - [`synthetic`] - SMOTE oversampling inside cross-validation folds
//! - [`training`] - Logistic regression, stratified k-fold, per-modality trainer
//! - [`calibration`] - Decision-threshold sweep on validation data
//! - [`fusion`] - Late, stacking and early fusion
//! - [`evaluation`] - Test metrics and report writers
//! - [`pipeline`] - End-to-end orchestration
//!
//! ## Services
//! - [`server`] - HTTP scoring API
//! - [`cli`] - Command-line interface

pub mod error;
pub mod config;

pub mod data;
pub mod extract;
pub mod split;

pub mod reduction;
pub mod preprocessing;
pub mod synthetic;
pub mod training;
pub mod calibration;
pub mod fusion;
pub mod evaluation;
pub mod pipeline;

pub mod server;
pub mod cli;

pub use error::{DepFusionError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{DepFusionError, Result};
    pub use crate::config::{
        LateFusionConfig, PipelineConfig, ReductionConfig, SplitConfig, ThresholdConfig, TrainerConfig,
    };
    pub use crate::data::{FeatureStore, LabelBuilder, MergedDataset, Modality};
    pub use crate::extract::{DataSource, FeatureExtractor, FsDataSource, SentimentAnalyzer};
    pub use crate::split::{Partition, SplitAssignment, SplitManager};
    pub use crate::reduction::PcaReducer;
    pub use crate::preprocessing::StandardScaler;
    pub use crate::synthetic::{Sampler, Smote};
    pub use crate::training::{LogisticRegression, ModalityModel, StratifiedKFold, UnimodalTrainer};
    pub use crate::calibration::{ThresholdChoice, ThresholdSweep};
    pub use crate::fusion::{
        EarlyFusion, FusionResult, FusionWeights, LateFusion, RiskTier, StackingFusion,
    };
    pub use crate::evaluation::{EvaluationReport, Evaluator, ModelVariant};
    pub use crate::pipeline::{Pipeline, PipelineReport};
}
