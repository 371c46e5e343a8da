//! SMOTE minority oversampling

use crate::error::{DepFusionError, Result};
use crate::synthetic::{class_counts, class_indices, ResampleResult, Sampler};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// Ordered float for BinaryHeap-based partial sort
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .partial_cmp(&other.0)
            .unwrap_or(Ordering::Equal)
            .then(self.1.cmp(&other.1))
    }
}

/// SMOTE (Synthetic Minority Over-sampling Technique)
///
/// Grows every non-majority class to the majority count by interpolating
/// between a class member and one of its `k` nearest same-class neighbours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Smote {
    k_neighbors: usize,
    seed: u64,
    target_counts: Option<BTreeMap<u8, usize>>,
}

impl Smote {
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            seed: 42,
            target_counts: None,
        }
    }

    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn k_neighbors(&self) -> usize {
        self.k_neighbors
    }

    fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// k nearest members of `pool` to `pool[center]`, excluding itself
    fn find_neighbors(&self, x: &Array2<f64>, pool: &[usize], center: usize) -> Vec<usize> {
        let k = self.k_neighbors;
        let point = x.row(pool[center]);
        let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);

        for (pos, &row) in pool.iter().enumerate() {
            if pos == center {
                continue;
            }
            let dist = Self::distance(point, x.row(row));
            if heap.len() < k {
                heap.push(DistIdx(dist, pos));
            } else if let Some(&top) = heap.peek() {
                let candidate = DistIdx(dist, pos);
                if candidate < top {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        let mut neighbors: Vec<DistIdx> = heap.into_vec();
        neighbors.sort();
        neighbors.into_iter().map(|DistIdx(_, pos)| pos).collect()
    }
}

impl Default for Smote {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for Smote {
    fn fit(&mut self, _x: &Array2<f64>, y: &Array1<u8>) -> Result<()> {
        let counts = class_counts(y);
        if counts.len() < 2 {
            return Err(DepFusionError::ValidationError(
                "Need at least 2 classes for SMOTE".to_string(),
            ));
        }

        let max_count = counts.values().copied().max().unwrap_or(0);
        for (&class, &count) in &counts {
            if count < max_count && count <= self.k_neighbors {
                return Err(DepFusionError::ValidationError(format!(
                    "SMOTE needs more than {} samples of class {}, got {}",
                    self.k_neighbors, class, count
                )));
            }
        }

        self.target_counts = Some(counts.keys().map(|&c| (c, max_count)).collect());
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<u8>) -> Result<ResampleResult> {
        let targets = self.target_counts.as_ref().ok_or_else(|| {
            DepFusionError::ValidationError("SMOTE not fitted".to_string())
        })?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let indices = class_indices(y);
        let n_features = x.ncols();

        let mut synthetic: Vec<f64> = Vec::new();
        let mut synthetic_y: Vec<u8> = Vec::new();
        let mut n_synthetic = Vec::with_capacity(targets.len());

        for (&class, &target) in targets {
            let pool = indices.get(&class).map(Vec::as_slice).unwrap_or(&[]);
            let n_to_generate = target.saturating_sub(pool.len());
            n_synthetic.push(n_to_generate);
            if n_to_generate == 0 || pool.len() < 2 {
                continue;
            }

            // Neighbour lists are fixed per class, so compute them once
            let neighbor_lists: Vec<Vec<usize>> = (0..pool.len())
                .map(|center| self.find_neighbors(x, pool, center))
                .collect();

            for _ in 0..n_to_generate {
                let center = rng.gen_range(0..pool.len());
                let neighbors = &neighbor_lists[center];
                let pick = neighbors[rng.gen_range(0..neighbors.len())];
                let gap: f64 = rng.gen();

                let a = x.row(pool[center]);
                let b = x.row(pool[pick]);
                synthetic.extend(a.iter().zip(b.iter()).map(|(&p, &n)| p + gap * (n - p)));
                synthetic_y.push(class);
            }
        }

        let n_original = x.nrows();
        let n_total = n_original + synthetic_y.len();
        let result_x = Array2::from_shape_fn((n_total, n_features), |(i, j)| {
            if i < n_original {
                x[[i, j]]
            } else {
                synthetic[(i - n_original) * n_features + j]
            }
        });

        let mut all_y: Vec<u8> = y.to_vec();
        all_y.extend_from_slice(&synthetic_y);

        Ok(ResampleResult {
            x: result_x,
            y: Array1::from_vec(all_y),
            n_synthetic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn imbalanced() -> (Array2<f64>, Array1<u8>) {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.2],
            [0.2, 0.1],
            [0.3, 0.3],
            [0.4, 0.2],
            [0.2, 0.4],
            [0.1, 0.1],
            [0.3, 0.0],
            [5.0, 5.0],
            [5.2, 5.1],
            [5.1, 5.3],
            [5.3, 5.2],
        ];
        let y = array![0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_smote_balances_classes() {
        let (x, y) = imbalanced();
        let mut smote = Smote::new().with_k_neighbors(3).with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        let counts = class_counts(&result.y);
        assert_eq!(counts[&0], 8);
        assert_eq!(counts[&1], 8);
        assert_eq!(result.x.nrows(), 16);
    }

    #[test]
    fn test_smote_keeps_originals_and_stays_in_hull() {
        let (x, y) = imbalanced();
        let mut smote = Smote::new().with_k_neighbors(3).with_seed(7);
        let result = smote.fit_resample(&x, &y).unwrap();

        for i in 0..x.nrows() {
            assert_eq!(result.x.row(i), x.row(i));
        }
        for i in x.nrows()..result.x.nrows() {
            let row = result.x.row(i);
            assert!(row.iter().all(|&v| (5.0..=5.3).contains(&v)),
                "synthetic minority point left its class region: {:?}", row);
        }
    }

    #[test]
    fn test_smote_is_seed_deterministic() {
        let (x, y) = imbalanced();
        let a = Smote::new().with_k_neighbors(3).with_seed(42).fit_resample(&x, &y).unwrap();
        let b = Smote::new().with_k_neighbors(3).with_seed(42).fit_resample(&x, &y).unwrap();
        assert_eq!(a.x, b.x);
    }

    #[test]
    fn test_smote_rejects_tiny_minority() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [9.0], [10.0]];
        let y = array![0, 0, 0, 0, 1, 1];
        let mut smote = Smote::new().with_k_neighbors(3);
        assert!(smote.fit(&x, &y).is_err());
    }

    #[test]
    fn test_smote_single_class() {
        let x = array![[0.0], [1.0]];
        let y = array![1, 1];
        assert!(Smote::new().fit(&x, &y).is_err());
    }
}
