//! Integration test: fusion weighting, meta-classifier and artifact round trips

use depfusion::calibration::ThresholdSweep;
use depfusion::config::{LateFusionConfig, ReductionConfig, TrainerConfig};
use depfusion::data::Modality;
use depfusion::fusion::{
    EarlyFusion, FusionResult, LateFusion, LateFusionModel, ProbabilityTable, RiskTier,
    StackingFusion, StackingModel,
};
use depfusion::reduction::PcaReducer;
use depfusion::training::{ModalityModel, UnimodalTrainer};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

fn labels(n: usize) -> Array1<u8> {
    Array1::from_shape_fn(n, |i| u8::from(i % 3 == 0))
}

fn noisy_features(y: &Array1<u8>, d: usize, shift: f64, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((y.len(), d), |(i, j)| {
        let signal = if j == 0 { shift * y[i] as f64 } else { 0.0 };
        signal + rng.gen_range(-1.0..1.0)
    })
}

fn probability_table(y: &Array1<u8>) -> ProbabilityTable {
    ProbabilityTable::from([
        (Modality::Text, y.mapv(|l| if l == 1 { 0.7 } else { 0.35 })),
        // Uninformative: constant gives AUC 0.5
        (Modality::Audio, Array1::from_elem(y.len(), 0.4)),
        (Modality::Visual, y.mapv(|l| if l == 1 { 0.55 } else { 0.5 })),
    ])
}

#[test]
fn test_weights_exclude_modalities_at_or_below_bar() {
    let late = LateFusion::new(LateFusionConfig::default());
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..200 {
        let aucs: BTreeMap<Modality, f64> = Modality::ALL
            .iter()
            .map(|&m| (m, rng.gen_range(0.3..0.9)))
            .collect();
        let (weights, fallback) = late.compute_weights(&aucs).unwrap();
        assert!((weights.sum() - 1.0).abs() < 1e-12);
        assert!(weights.iter().all(|(_, w)| w >= 0.0));
        let any_relevant = aucs.values().any(|&a| a > 0.52);
        assert_eq!(fallback, !any_relevant);
        if any_relevant {
            for (m, auc) in &aucs {
                if *auc <= 0.52 {
                    assert_eq!(weights.get(*m), 0.0);
                }
            }
        }
    }
}

#[test]
fn test_bar_is_exclusive() {
    let late = LateFusion::new(LateFusionConfig::default());
    let aucs = BTreeMap::from([
        (Modality::Text, 0.52),
        (Modality::Audio, 0.60),
        (Modality::Visual, 0.70),
    ]);
    let (weights, fallback) = late.compute_weights(&aucs).unwrap();
    assert!(!fallback);
    assert_eq!(weights.get(Modality::Text), 0.0);
    assert!((weights.get(Modality::Audio) - 1.0 / 3.0).abs() < 1e-12);
    assert!((weights.get(Modality::Visual) - 2.0 / 3.0).abs() < 1e-12);
}

#[test]
fn test_late_fusion_fit_and_monotonicity() {
    let y = labels(30);
    let val = probability_table(&y);
    let (model, choice) = LateFusion::new(LateFusionConfig::default())
        .fit(&val, &y, &ThresholdSweep::default(), 0.40)
        .unwrap();

    assert_eq!(model.weights.get(Modality::Audio), 0.0);
    assert!(model.validation_auc[&Modality::Text] > 0.99);
    assert_eq!(model.threshold, choice.threshold);

    let base = model.predict_proba(&val).unwrap();
    let mut bumped = val.clone();
    bumped.insert(Modality::Text, val[&Modality::Text].mapv(|p| p + 0.1));
    let after = model.predict_proba(&bumped).unwrap();
    for (a, b) in base.iter().zip(after.iter()) {
        assert!(b >= a);
    }
}

#[test]
fn test_late_fusion_artifact_round_trip() {
    let y = labels(30);
    let val = probability_table(&y);
    let (model, _) = LateFusion::new(LateFusionConfig::default())
        .fit(&val, &y, &ThresholdSweep::default(), 0.40)
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    model.save(dir.path()).unwrap();
    let loaded = LateFusionModel::load(dir.path()).unwrap();
    assert_eq!(loaded.weights, model.weights);
    assert_eq!(loaded.predict_proba(&val).unwrap(), model.predict_proba(&val).unwrap());
}

#[test]
fn test_stacking_round_trip_is_bit_exact() {
    let y = labels(45);
    let train = probability_table(&y);
    let (model, _) = StackingFusion::new()
        .fit(&train, &y, &train, &y, &ThresholdSweep::default(), 0.5)
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    model.save(dir.path()).unwrap();
    let loaded = StackingModel::load(dir.path()).unwrap();

    let before = model.predict_proba(&train).unwrap();
    let after = loaded.predict_proba(&train).unwrap();
    assert_eq!(before, after);
    assert_eq!(loaded.threshold, model.threshold);
    // The informative text column carries the largest positive weight
    let coefs: BTreeMap<Modality, f64> = loaded.coefficients().into_iter().collect();
    assert!(coefs[&Modality::Text] > 0.0);
    assert!(coefs[&Modality::Text] > coefs[&Modality::Audio].abs());
}

fn quick_trainer() -> TrainerConfig {
    TrainerConfig {
        c_grid: vec![0.1, 1.0],
        max_iter: 500,
        ..TrainerConfig::default()
    }
}

#[test]
fn test_modality_model_round_trip() {
    let y = labels(60);
    let x = noisy_features(&y, 6, 2.0, 3);
    let trained = UnimodalTrainer::new(quick_trainer())
        .train("text", &x, &y, 0.5)
        .unwrap();
    assert!([0.1, 1.0].contains(&trained.selection.best().c));

    let dir = tempfile::tempdir().unwrap();
    trained.model.save(dir.path()).unwrap();
    let loaded = ModalityModel::load(dir.path(), "text").unwrap();
    assert_eq!(
        loaded.predict_proba(&x).unwrap(),
        trained.model.predict_proba(&x).unwrap()
    );
    assert_eq!(loaded.threshold, trained.model.threshold);
}

#[test]
fn test_early_fusion_trains_on_concatenation() {
    let y = labels(60);
    let text = noisy_features(&y, 3, 2.0, 1);
    let audio = noisy_features(&y, 4, 0.5, 2);
    let visual = noisy_features(&y, 2, 0.5, 3);
    let x = EarlyFusion::concat(&text, &audio, &visual).unwrap();
    assert_eq!(x.ncols(), 9);

    let train: Vec<usize> = (0..45).collect();
    let val: Vec<usize> = (45..60).collect();
    let (trained, choice) = EarlyFusion::new(quick_trainer())
        .fit(
            &x.select(Axis(0), &train),
            &y.select(Axis(0), &train),
            &x.select(Axis(0), &val),
            &y.select(Axis(0), &val),
            &ThresholdSweep::default(),
            0.5,
        )
        .unwrap();
    assert_eq!(trained.model.name, "early_fusion");
    assert_eq!(trained.model.n_features(), Some(9));
    assert_eq!(trained.model.threshold, choice.threshold);
}

#[test]
fn test_reduction_ignores_held_out_rows() {
    let y = labels(40);
    let x = noisy_features(&y, 30, 1.0, 9);
    let train: Vec<usize> = (0..28).collect();

    let mut with_all = PcaReducer::new(&ReductionConfig::default());
    with_all.fit_rows(&x, &train).unwrap();

    // Perturb held-out rows; the basis must not move
    let mut perturbed = x.clone();
    for i in 28..40 {
        perturbed.row_mut(i).mapv_inplace(|v| v * 100.0 + 5.0);
    }
    let mut with_perturbed = PcaReducer::new(&ReductionConfig::default());
    with_perturbed.fit_rows(&perturbed, &train).unwrap();

    assert_eq!(with_all.components(), with_perturbed.components());
    assert_eq!(with_all.n_components(), 20);
}

#[test]
fn test_fusion_result_tiers() {
    let r = FusionResult::from_probability(0.59, 0.5);
    assert_eq!(r.risk_tier, RiskTier::Moderate);
    assert!(r.prediction);
    let r = FusionResult::from_probability(0.61, 0.65);
    assert_eq!(r.risk_tier, RiskTier::High);
    assert!(!r.prediction);
}
