//! Test-partition evaluation and result writers

use super::metrics::{roc_curve, ClassificationReport, RocCurve};
use crate::data::{write_csv, Modality};
use crate::error::Result;
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// The six evaluated model variants, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelVariant {
    Unimodal(Modality),
    LateFusion,
    StackingFusion,
    EarlyFusion,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 6] = [
        ModelVariant::Unimodal(Modality::Text),
        ModelVariant::Unimodal(Modality::Audio),
        ModelVariant::Unimodal(Modality::Visual),
        ModelVariant::LateFusion,
        ModelVariant::StackingFusion,
        ModelVariant::EarlyFusion,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelVariant::Unimodal(m) => m.display_name(),
            ModelVariant::LateFusion => "Late Fusion",
            ModelVariant::StackingFusion => "Stacking Fusion",
            ModelVariant::EarlyFusion => "Early Fusion",
        }
    }

    /// Display name with spaces replaced, for file names
    pub fn file_stem(&self) -> String {
        self.display_name().replace(' ', "_")
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Held-out metrics and ROC points of one variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantResult {
    pub variant: ModelVariant,
    pub threshold: f64,
    pub report: ClassificationReport,
    pub roc: RocCurve,
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, Serialize)]
struct ConfusionArtifact<'a> {
    model: &'a str,
    threshold: f64,
    labels: [&'static str; 2],
    matrix: [[usize; 2]; 2],
}

#[derive(Debug, Clone, Serialize)]
struct RocArtifact<'a> {
    model: &'a str,
    auc: f64,
    fpr: &'a [f64],
    tpr: &'a [f64],
}

#[derive(Debug, Clone, Serialize)]
struct ComparisonArtifact {
    metrics: [&'static str; 5],
    models: BTreeMap<String, [f64; 5]>,
}

/// Collected results of one evaluation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub results: Vec<VariantResult>,
}

impl EvaluationReport {
    pub fn get(&self, variant: ModelVariant) -> Option<&VariantResult> {
        self.results.iter().find(|r| r.variant == variant)
    }

    /// Variant with the highest test F1 (first on ties)
    pub fn best_by_f1(&self) -> Option<&VariantResult> {
        let mut best: Option<&VariantResult> = None;
        for r in &self.results {
            if best.map_or(true, |b| r.report.f1 > b.report.f1) {
                best = Some(r);
            }
        }
        best
    }

    /// `Model, Accuracy, F1, Precision, Recall, AUC-ROC`, rounded to 4 decimals
    pub fn to_frame(&self) -> Result<DataFrame> {
        let col = |f: fn(&ClassificationReport) -> f64| -> Vec<f64> {
            self.results.iter().map(|r| round4(f(&r.report))).collect()
        };
        let names: Vec<&str> = self.results.iter().map(|r| r.variant.display_name()).collect();
        Ok(DataFrame::new(vec![
            Series::new("Model".into(), names).into(),
            Series::new("Accuracy".into(), col(|r: &ClassificationReport| r.accuracy)).into(),
            Series::new("F1".into(), col(|r: &ClassificationReport| r.f1)).into(),
            Series::new("Precision".into(), col(|r: &ClassificationReport| r.precision)).into(),
            Series::new("Recall".into(), col(|r: &ClassificationReport| r.recall)).into(),
            Series::new("AUC-ROC".into(), col(|r: &ClassificationReport| r.auc)).into(),
        ])?)
    }

    /// Write the metrics table and chart data under `dir`
    pub fn write(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        let table_path = dir.join("all_results.csv");
        write_csv(&mut self.to_frame()?, &table_path)?;
        written.push(table_path);

        for r in &self.results {
            let path = dir.join(format!("{}_confusion_matrix.json", r.variant.file_stem()));
            let artifact = ConfusionArtifact {
                model: r.variant.display_name(),
                threshold: r.threshold,
                labels: ["Not Depressed", "Depressed"],
                matrix: r.report.confusion.as_rows(),
            };
            std::fs::write(&path, serde_json::to_string_pretty(&artifact)?)?;
            written.push(path);
        }

        let curves: Vec<RocArtifact> = self
            .results
            .iter()
            .map(|r| RocArtifact {
                model: r.variant.display_name(),
                auc: round4(r.report.auc),
                fpr: &r.roc.fpr,
                tpr: &r.roc.tpr,
            })
            .collect();
        let roc_path = dir.join("roc_curves.json");
        std::fs::write(&roc_path, serde_json::to_string_pretty(&curves)?)?;
        written.push(roc_path);

        let comparison = ComparisonArtifact {
            metrics: ["Accuracy", "F1", "Precision", "Recall", "AUC-ROC"],
            models: self
                .results
                .iter()
                .map(|r| {
                    let m = &r.report;
                    (
                        r.variant.display_name().to_string(),
                        [m.accuracy, m.f1, m.precision, m.recall, m.auc].map(round4),
                    )
                })
                .collect(),
        };
        let cmp_path = dir.join("model_comparison.json");
        std::fs::write(&cmp_path, serde_json::to_string_pretty(&comparison)?)?;
        written.push(cmp_path);

        info!(dir = %dir.display(), files = written.len(), "Wrote evaluation results");
        Ok(written)
    }
}

/// Scores variants on the test partition
#[derive(Debug, Clone)]
pub struct Evaluator {
    y_test: Array1<u8>,
    report: EvaluationReport,
}

impl Evaluator {
    pub fn new(y_test: Array1<u8>) -> Self {
        Self {
            y_test,
            report: EvaluationReport::default(),
        }
    }

    /// Score one variant's test probabilities at its calibrated threshold
    pub fn evaluate(&mut self, variant: ModelVariant, proba: &Array1<f64>, threshold: f64) -> Result<&VariantResult> {
        let report = ClassificationReport::compute(&self.y_test, proba, threshold)?;
        let roc = roc_curve(&self.y_test, proba);
        let cm = report.confusion;
        info!(
            model = %variant,
            threshold,
            accuracy = round4(report.accuracy),
            f1 = round4(report.f1),
            precision = round4(report.precision),
            recall = round4(report.recall),
            auc = round4(report.auc),
            tn = cm.tn,
            fp = cm.fp,
            fn_ = cm.fn_,
            tp = cm.tp,
            "Test evaluation"
        );
        self.report.results.push(VariantResult {
            variant,
            threshold,
            report,
            roc,
        });
        let last = self.report.results.len() - 1;
        Ok(&self.report.results[last])
    }

    pub fn finish(self) -> EvaluationReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn evaluated() -> EvaluationReport {
        let y = array![0u8, 0, 1, 1, 0, 1];
        let mut ev = Evaluator::new(y);
        ev.evaluate(ModelVariant::Unimodal(Modality::Text), &array![0.1, 0.4, 0.35, 0.8, 0.2, 0.9], 0.5)
            .unwrap();
        ev.evaluate(ModelVariant::LateFusion, &array![0.1, 0.2, 0.7, 0.8, 0.3, 0.9], 0.4)
            .unwrap();
        ev.finish()
    }

    #[test]
    fn test_variant_names() {
        let names: Vec<&str> = ModelVariant::ALL.iter().map(|v| v.display_name()).collect();
        assert_eq!(
            names,
            vec!["Text Only", "Audio Only", "Visual Only", "Late Fusion", "Stacking Fusion", "Early Fusion"]
        );
        assert_eq!(ModelVariant::StackingFusion.file_stem(), "Stacking_Fusion");
    }

    #[test]
    fn test_best_by_f1() {
        let report = evaluated();
        assert_eq!(report.best_by_f1().unwrap().variant, ModelVariant::LateFusion);
        assert_eq!(report.get(ModelVariant::LateFusion).unwrap().report.f1, 1.0);
    }

    #[test]
    fn test_table_is_rounded() {
        let report = evaluated();
        let df = report.to_frame().unwrap();
        assert_eq!(df.height(), 2);
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["Model", "Accuracy", "F1", "Precision", "Recall", "AUC-ROC"]);
        let acc = crate::data::column_f64(&df, "Accuracy").unwrap();
        assert_eq!(acc[0], 0.8333);
    }

    #[test]
    fn test_writes_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let written = evaluated().write(dir.path()).unwrap();
        assert_eq!(written.len(), 5);
        assert!(dir.path().join("all_results.csv").exists());
        assert!(dir.path().join("Text_Only_confusion_matrix.json").exists());
        assert!(dir.path().join("Late_Fusion_confusion_matrix.json").exists());

        let roc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("roc_curves.json")).unwrap()).unwrap();
        assert_eq!(roc.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_single_class_test_set_errors() {
        let mut ev = Evaluator::new(array![1u8, 1]);
        assert!(ev.evaluate(ModelVariant::EarlyFusion, &array![0.2, 0.9], 0.5).is_err());
    }
}
