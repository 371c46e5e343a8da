//! Held-out evaluation of every model variant

pub mod metrics;
pub mod report;

pub use metrics::{
    accuracy_score, apply_threshold, f1_score, roc_auc_score, roc_curve, ClassificationReport,
    ConfusionMatrix, RocCurve,
};
pub use report::{EvaluationReport, Evaluator, ModelVariant, VariantResult};
