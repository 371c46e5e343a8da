//! Integration test: feature store → split → reduce → train → fuse → evaluate

use depfusion::calibration::ThresholdSweep;
use depfusion::config::{PipelineConfig, TrainerConfig};
use depfusion::data::{read_csv, write_csv, FeatureStore, LabelTable, Modality};
use depfusion::evaluation::ModelVariant;
use depfusion::fusion::{EarlyFusion, LateFusionModel, ProbabilityTable, StackingModel, EARLY_FUSION_NAME};
use depfusion::pipeline::Pipeline;
use depfusion::reduction::PcaReducer;
use depfusion::split::SplitManager;
use depfusion::training::ModalityModel;
use ndarray::{Array2, Axis};
use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::path::Path;

const N: usize = 80;

/// Participants with a label-correlated signal in every modality
fn write_corpus(dir: &Path) {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let pids: Vec<i64> = (300..300 + N as i64).collect();
    let labels: Vec<u8> = (0..N).map(|i| u8::from(i % 10 < 3)).collect();
    let scores: Vec<f64> = labels.iter().map(|&l| if l == 1 { 14.0 } else { 4.0 }).collect();
    LabelTable { pids: pids.clone(), scores, labels: labels.clone() }
        .write(&dir.join("master_labels.csv"))
        .unwrap();

    let mut signal = |shift: f64, noise: f64| -> Vec<f64> {
        labels
            .iter()
            .map(|&l| shift * l as f64 + rng.gen_range(-noise..noise))
            .collect::<Vec<f64>>()
    };

    let mut text: Vec<Column> = vec![Series::new("pid".into(), pids.clone()).into()];
    text.push(Series::new("sent_compound".into(), signal(-0.8, 0.6)).into());
    text.push(Series::new("word_count".into(), signal(40.0, 60.0)).into());
    text.push(Series::new("lexical_div".into(), signal(0.0, 0.2)).into());
    for j in 0..4 {
        text.push(Series::new(format!("tfidf_{}", j).into(), signal(0.1, 0.3)).into());
    }
    let mut df = DataFrame::new(text).unwrap();
    write_csv(&mut df, &dir.join(Modality::Text.table_file())).unwrap();

    let mut audio: Vec<Column> = vec![Series::new("pid".into(), pids.clone()).into()];
    for j in 0..30 {
        let shift = if j < 5 { 1.0 } else { 0.0 };
        audio.push(Series::new(format!("mfcc_{}", j).into(), signal(shift, 1.0)).into());
    }
    let mut df = DataFrame::new(audio).unwrap();
    write_csv(&mut df, &dir.join(Modality::Audio.table_file())).unwrap();

    let mut visual: Vec<Column> = vec![Series::new("pid".into(), pids.clone()).into()];
    for j in 0..25 {
        let shift = if j < 3 { 0.6 } else { 0.0 };
        visual.push(Series::new(format!("AU{:02}_r_mean", j).into(), signal(shift, 1.0)).into());
    }
    let mut df = DataFrame::new(visual).unwrap();
    write_csv(&mut df, &dir.join(Modality::Visual.table_file())).unwrap();
}

fn quick_config(root: &Path) -> PipelineConfig {
    PipelineConfig::default()
        .with_features_dir(root.join("features"))
        .with_models_dir(root.join("models"))
        .with_results_dir(root.join("results"))
        .with_trainer(TrainerConfig {
            c_grid: vec![0.1, 1.0],
            max_iter: 500,
            ..TrainerConfig::default()
        })
}

#[test]
fn test_full_run_writes_every_artifact() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("features")).unwrap();
    write_corpus(&root.path().join("features"));

    let report = Pipeline::new(quick_config(root.path())).run().unwrap();

    assert_eq!(report.n_participants, N);
    assert_eq!(report.n_train + report.n_val + report.n_test, N);
    assert_eq!(report.n_test, 12);
    assert_eq!(report.n_val, 12);

    // Audio and visual are reduced to at most 20 components, text is kept
    assert_eq!(report.feature_widths[&Modality::Text], 7);
    assert_eq!(report.feature_widths[&Modality::Audio], 20);
    assert_eq!(report.feature_widths[&Modality::Visual], 20);

    for variant in ModelVariant::ALL {
        let result = report.evaluation.get(variant).expect("variant evaluated");
        assert!((0.0..=1.0).contains(&result.report.auc));
    }
    assert!((report.late_fusion.weights.sum() - 1.0).abs() < 1e-9);
    assert_eq!(report.stacking_coefficients.len(), 3);

    let models = root.path().join("models");
    for name in ["text", "audio", "visual", "early_fusion"] {
        assert!(models.join(format!("{}_model.json", name)).exists(), "{}", name);
        assert!(models.join(format!("{}_scaler.json", name)).exists(), "{}", name);
    }
    assert!(models.join("stacking_fusion_model.json").exists());
    assert!(models.join("late_fusion_weights.json").exists());

    let results = root.path().join("results");
    assert!(results.join("all_results.csv").exists());
    assert!(results.join("roc_curves.json").exists());
    assert!(results.join("model_comparison.json").exists());

    let features = root.path().join("features");
    assert!(features.join("audio_reduced.csv").exists());
    assert!(features.join("visual_reduced.csv").exists());
    assert!(!features.join("text_reduced.csv").exists());
}

#[test]
fn test_thresholds_are_calibrated_on_validation() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("features")).unwrap();
    write_corpus(&root.path().join("features"));
    let config = quick_config(root.path());
    let report = Pipeline::new(config.clone()).run().unwrap();

    // Rebuild the validation inputs from the saved artifacts
    let dataset = FeatureStore::new(&config.features_dir).load().unwrap();
    let split = SplitManager::new(config.split.clone()).split(&dataset.labels).unwrap();
    let y_val = dataset.labels.select(Axis(0), &split.val);
    let features = |modality: Modality| -> Array2<f64> {
        let raw = &dataset.modality(modality).values;
        if !modality.is_high_dimensional() {
            return raw.clone();
        }
        let mut reducer = PcaReducer::new(&config.reduction);
        reducer.fit_rows(raw, &split.train).unwrap();
        reducer.transform(raw).unwrap()
    };
    let matrices: Vec<(Modality, Array2<f64>)> =
        Modality::ALL.iter().map(|&m| (m, features(m))).collect();

    let sweep = ThresholdSweep::from_config(&config.threshold);
    let mut val_table = ProbabilityTable::new();
    let mut any_improved = false;
    for (modality, x) in &matrices {
        let model = ModalityModel::load(&config.models_dir, modality.name()).unwrap();
        let proba = model.predict_proba(&x.select(Axis(0), &split.val)).unwrap();
        let choice = sweep.select(&y_val, &proba, config.threshold.unimodal_default);
        assert_eq!(report.thresholds[modality.name()], choice.threshold, "{}", modality);
        assert_eq!(model.threshold, choice.threshold, "{}", modality);
        any_improved |= choice.improved;
        val_table.insert(*modality, proba);
    }
    assert!(any_improved, "every unimodal threshold fell back to the default");

    let late = LateFusionModel::load(&config.models_dir).unwrap();
    let choice = sweep.select(
        &y_val,
        &late.predict_proba(&val_table).unwrap(),
        config.threshold.late_fusion_default,
    );
    assert_eq!(report.thresholds["late_fusion"], choice.threshold);
    assert_eq!(late.threshold, choice.threshold);

    let stacking = StackingModel::load(&config.models_dir).unwrap();
    let choice = sweep.select(
        &y_val,
        &stacking.predict_proba(&val_table).unwrap(),
        config.threshold.stacking_default,
    );
    assert_eq!(report.thresholds["stacking"], choice.threshold);

    let early = ModalityModel::load(&config.models_dir, EARLY_FUSION_NAME).unwrap();
    let concat = EarlyFusion::concat(&matrices[0].1, &matrices[1].1, &matrices[2].1).unwrap();
    let choice = sweep.select(
        &y_val,
        &early.predict_proba(&concat.select(Axis(0), &split.val)).unwrap(),
        config.threshold.unimodal_default,
    );
    assert_eq!(report.thresholds[EARLY_FUSION_NAME], choice.threshold);
}

#[test]
fn test_reduced_table_marks_partitions() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("features")).unwrap();
    write_corpus(&root.path().join("features"));
    let config = quick_config(root.path());
    let report = Pipeline::new(config.clone()).run().unwrap();

    let reduced = read_csv(&root.path().join("features/audio_reduced.csv"), b',').unwrap();
    assert_eq!(reduced.height(), N);
    let split: Vec<String> = reduced
        .column("split")
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .into_iter()
        .map(|s| s.unwrap_or_default().to_string())
        .collect();
    let count = |name: &str| split.iter().filter(|s| s.as_str() == name).count();
    assert_eq!(count("train"), report.n_train);
    assert_eq!(count("val"), report.n_val);
    assert_eq!(count("test"), report.n_test);
    assert!(reduced.column("pc_0").is_ok());
}

#[test]
fn test_split_is_seeded_and_disjoint() {
    let root = tempfile::tempdir().unwrap();
    write_corpus(root.path());
    let dataset = FeatureStore::new(root.path()).load().unwrap();

    let manager = SplitManager::new(PipelineConfig::default().split);
    let a = manager.split(&dataset.labels).unwrap();
    let b = manager.split(&dataset.labels).unwrap();
    assert_eq!(a, b);

    let train: HashSet<_> = a.train.iter().collect();
    let val: HashSet<_> = a.val.iter().collect();
    let test: HashSet<_> = a.test.iter().collect();
    assert!(train.is_disjoint(&val));
    assert!(train.is_disjoint(&test));
    assert!(val.is_disjoint(&test));
    assert_eq!(train.len() + val.len() + test.len(), N);

    // 30% positives overall; each partition keeps some of both classes
    for rows in [&a.train, &a.val, &a.test] {
        let pos = rows.iter().filter(|&&i| dataset.labels[i] == 1).count();
        assert!(pos > 0 && pos < rows.len());
    }
}

#[test]
fn test_runs_are_reproducible() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("features")).unwrap();
    write_corpus(&root.path().join("features"));
    let config = quick_config(root.path());

    let first = Pipeline::new(config.clone()).run().unwrap();
    let second = Pipeline::new(config).run().unwrap();
    assert_eq!(first.thresholds, second.thresholds);
    for (a, b) in first.evaluation.results.iter().zip(&second.evaluation.results) {
        assert_eq!(a.variant, b.variant);
        assert_eq!(a.report.f1, b.report.f1);
        assert_eq!(a.report.auc, b.report.auc);
    }
}

#[test]
fn test_missing_feature_table_fails() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("features")).unwrap();
    write_corpus(&root.path().join("features"));
    std::fs::remove_file(root.path().join("features").join(Modality::Visual.table_file())).unwrap();
    assert!(Pipeline::new(quick_config(root.path())).run().is_err());
}
