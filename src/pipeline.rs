//! End-to-end training run
//!
//! load -> split -> reduce (train rows only) -> per-modality training and
//! calibration -> late / stacking / early fusion -> test evaluation.

use crate::calibration::ThresholdSweep;
use crate::config::PipelineConfig;
use crate::data::{write_csv, FeatureStore, MergedDataset, Modality, PID_COLUMN};
use crate::error::Result;
use crate::evaluation::{EvaluationReport, Evaluator, ModelVariant};
use crate::fusion::{EarlyFusion, LateFusion, LateFusionModel, ProbabilityTable, StackingFusion, StackingModel};
use crate::reduction::PcaReducer;
use crate::split::{Partition, SplitAssignment, SplitManager};
use crate::training::{ModalityModel, StrengthSelection, UnimodalTrainer};
use ndarray::{Array2, Axis};
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, info_span};

/// Summary of one run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub n_participants: usize,
    pub n_train: usize,
    pub n_val: usize,
    pub n_test: usize,
    /// Feature width each modality was trained on
    pub feature_widths: BTreeMap<Modality, usize>,
    pub selections: BTreeMap<Modality, StrengthSelection>,
    pub thresholds: BTreeMap<String, f64>,
    pub late_fusion: LateFusionModel,
    pub stacking_coefficients: Vec<(Modality, f64)>,
    pub evaluation: EvaluationReport,
    pub artifacts: Vec<PathBuf>,
    pub elapsed_secs: f64,
}

/// Feature matrices after reduction, aligned with the merged dataset rows
struct PreparedFeatures {
    matrices: BTreeMap<Modality, Array2<f64>>,
}

impl PreparedFeatures {
    fn rows(&self, modality: Modality, indices: &[usize]) -> Array2<f64> {
        self.matrices[&modality].select(Axis(0), indices)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self) -> Result<PipelineReport> {
        let dataset = FeatureStore::new(&self.config.features_dir).load()?;
        self.run_on(&dataset)
    }

    /// Run on an already merged dataset
    pub fn run_on(&self, dataset: &MergedDataset) -> Result<PipelineReport> {
        self.config.validate()?;
        let started = Instant::now();
        let cfg = &self.config;
        let y = &dataset.labels;
        let split = SplitManager::new(cfg.split.clone()).split(y)?;
        let y_train = y.select(Axis(0), &split.train);
        let y_val = y.select(Axis(0), &split.val);
        let y_test = y.select(Axis(0), &split.test);

        let mut artifacts = Vec::new();
        let features = self.reduce(dataset, &split, &mut artifacts)?;

        let sweep = ThresholdSweep::from_config(&cfg.threshold);
        let trainer = UnimodalTrainer::new(cfg.trainer.clone());
        let mut thresholds = BTreeMap::new();
        let mut selections = BTreeMap::new();
        let mut feature_widths = BTreeMap::new();
        let mut models: BTreeMap<Modality, ModalityModel> = BTreeMap::new();

        for modality in Modality::ALL {
            let _span = info_span!("modality", name = modality.name()).entered();
            let x_train = features.rows(modality, &split.train);
            let x_val = features.rows(modality, &split.val);
            feature_widths.insert(modality, x_train.ncols());

            let mut trained = trainer.train(
                modality.name(),
                &x_train,
                &y_train,
                cfg.threshold.unimodal_default,
            )?;
            trained
                .model
                .calibrate(&x_val, &y_val, &sweep, cfg.threshold.unimodal_default)?;
            trained.model.save(&cfg.models_dir)?;
            artifacts.push(ModalityModel::model_path(&cfg.models_dir, modality.name()));
            artifacts.push(ModalityModel::scaler_path(&cfg.models_dir, modality.name()));

            thresholds.insert(modality.name().to_string(), trained.model.threshold);
            selections.insert(modality, trained.selection);
            models.insert(modality, trained.model);
        }

        let table = |rows: &[usize]| -> Result<ProbabilityTable> {
            let mut t = ProbabilityTable::new();
            for (&modality, model) in &models {
                t.insert(modality, model.predict_proba(&features.rows(modality, rows))?);
            }
            Ok(t)
        };
        let train_table = table(&split.train)?;
        let val_table = table(&split.val)?;
        let test_table = table(&split.test)?;

        let (late, _) = LateFusion::new(cfg.late_fusion.clone()).fit(
            &val_table,
            &y_val,
            &sweep,
            cfg.threshold.late_fusion_default,
        )?;
        late.save(&cfg.models_dir)?;
        artifacts.push(LateFusionModel::artifact_path(&cfg.models_dir));
        thresholds.insert("late_fusion".to_string(), late.threshold);

        let (stacking, _) = StackingFusion::new().with_max_iter(cfg.trainer.max_iter).fit(
            &train_table,
            &y_train,
            &val_table,
            &y_val,
            &sweep,
            cfg.threshold.stacking_default,
        )?;
        stacking.save(&cfg.models_dir)?;
        artifacts.push(StackingModel::artifact_path(&cfg.models_dir));
        thresholds.insert("stacking".to_string(), stacking.threshold);

        let early_matrix = EarlyFusion::concat(
            &features.matrices[&Modality::Text],
            &features.matrices[&Modality::Audio],
            &features.matrices[&Modality::Visual],
        )?;
        let (early, _) = {
            let _span = info_span!("modality", name = "early_fusion").entered();
            EarlyFusion::new(cfg.trainer.clone()).fit(
                &early_matrix.select(Axis(0), &split.train),
                &y_train,
                &early_matrix.select(Axis(0), &split.val),
                &y_val,
                &sweep,
                cfg.threshold.unimodal_default,
            )?
        };
        early.model.save(&cfg.models_dir)?;
        artifacts.push(ModalityModel::model_path(&cfg.models_dir, &early.model.name));
        artifacts.push(ModalityModel::scaler_path(&cfg.models_dir, &early.model.name));
        thresholds.insert(early.model.name.clone(), early.model.threshold);

        let mut evaluator = Evaluator::new(y_test);
        for (&modality, model) in &models {
            evaluator.evaluate(ModelVariant::Unimodal(modality), &test_table[&modality], model.threshold)?;
        }
        evaluator.evaluate(ModelVariant::LateFusion, &late.predict_proba(&test_table)?, late.threshold)?;
        evaluator.evaluate(
            ModelVariant::StackingFusion,
            &stacking.predict_proba(&test_table)?,
            stacking.threshold,
        )?;
        evaluator.evaluate(
            ModelVariant::EarlyFusion,
            &early.model.predict_proba(&early_matrix.select(Axis(0), &split.test))?,
            early.model.threshold,
        )?;
        let evaluation = evaluator.finish();
        artifacts.extend(evaluation.write(&cfg.results_dir)?);

        if let Some(best) = evaluation.best_by_f1() {
            info!(model = %best.variant, f1 = best.report.f1, "Best model on test partition");
        }

        Ok(PipelineReport {
            n_participants: dataset.len(),
            n_train: split.train.len(),
            n_val: split.val.len(),
            n_test: split.test.len(),
            feature_widths,
            selections,
            thresholds,
            stacking_coefficients: stacking.coefficients(),
            late_fusion: late,
            evaluation,
            artifacts,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Project high-dimensional modalities onto a basis fit on training rows
    fn reduce(
        &self,
        dataset: &MergedDataset,
        split: &SplitAssignment,
        artifacts: &mut Vec<PathBuf>,
    ) -> Result<PreparedFeatures> {
        let mut matrices = BTreeMap::new();
        for modality in Modality::ALL {
            let raw = &dataset.modality(modality).values;
            if !modality.is_high_dimensional() {
                matrices.insert(modality, raw.clone());
                continue;
            }
            let mut reducer = PcaReducer::new(&self.config.reduction);
            reducer.fit_rows(raw, &split.train)?;
            let reduced = reducer.transform(raw)?;
            info!(
                modality = %modality,
                from = raw.ncols(),
                to = reduced.ncols(),
                "Reduced feature space"
            );
            if self.config.persist_reduced {
                let path = self
                    .config
                    .features_dir
                    .join(format!("{}_reduced.csv", modality.name()));
                write_reduced(&path, dataset, split, &reduced)?;
                artifacts.push(path);
            }
            matrices.insert(modality, reduced);
        }
        Ok(PreparedFeatures { matrices })
    }
}

/// `pid, label, split, pc_0..` for every participant
fn write_reduced(path: &Path, dataset: &MergedDataset, split: &SplitAssignment, reduced: &Array2<f64>) -> Result<()> {
    let partitions = split.by_pid(&dataset.pids);
    let split_names: Vec<&str> = dataset
        .pids
        .iter()
        .map(|pid| partitions.get(pid).map_or("", Partition::as_str))
        .collect();
    let labels: Vec<i32> = dataset.labels.iter().map(|&l| l as i32).collect();

    let mut columns: Vec<Column> = vec![
        Series::new(PID_COLUMN.into(), dataset.pids.clone()).into(),
        Series::new("label".into(), labels).into(),
        Series::new("split".into(), split_names).into(),
    ];
    for (j, col) in reduced.axis_iter(Axis(1)).enumerate() {
        let values: Vec<f64> = col.to_vec();
        columns.push(Series::new(format!("pc_{}", j).into(), values).into());
    }
    let mut df = DataFrame::new(columns)?;
    write_csv(&mut df, path)
}
