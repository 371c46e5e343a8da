//! Stratified k-fold cross-validation

use crate::error::{DepFusionError, Result};
use crate::synthetic::class_indices;
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Stratified k-fold splitter
///
/// Class members are shuffled with a seeded ChaCha8 stream and dealt
/// round-robin across folds, continuing the deal from one class to the next
/// so fold sizes differ by at most one.
#[derive(Debug, Clone)]
pub struct StratifiedKFold {
    n_splits: usize,
    shuffle: bool,
    random_state: u64,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: true,
            random_state: 42,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Generate train/test splits
    ///
    /// Every class needs at least `n_splits` members, otherwise some fold
    /// would be scored without that class.
    pub fn split(&self, y: &Array1<u8>) -> Result<Vec<CVSplit>> {
        let n_splits = self.n_splits;
        if n_splits < 2 {
            return Err(DepFusionError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }

        let mut by_class = class_indices(y);
        if by_class.len() < 2 {
            return Err(DepFusionError::TrainingError(
                "Stratified cross-validation needs both classes".to_string(),
            ));
        }
        for (class, members) in &by_class {
            if members.len() < n_splits {
                return Err(DepFusionError::TrainingError(format!(
                    "Class {} has {} members, fewer than {} folds",
                    class,
                    members.len(),
                    n_splits
                )));
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        if self.shuffle {
            for members in by_class.values_mut() {
                members.shuffle(&mut rng);
            }
        }

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut offset = 0;
        for members in by_class.values() {
            for (i, &idx) in members.iter().enumerate() {
                folds[(offset + i) % n_splits].push(idx);
            }
            offset += members.len();
        }
        for fold in folds.iter_mut() {
            fold.sort_unstable();
        }

        let splits = (0..n_splits)
            .map(|fold_idx| {
                let mut train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                train_indices.sort_unstable();
                CVSplit {
                    train_indices,
                    test_indices: folds[fold_idx].clone(),
                    fold_idx,
                }
            })
            .collect();

        Ok(splits)
    }
}

/// Per-fold scores with summary statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Population standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let denom = n_folds.max(1) as f64;
        let mean_score = scores.iter().sum::<f64>() / denom;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / denom;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}
