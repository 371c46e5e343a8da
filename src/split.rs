//! Stratified train / validation / test partitioning

use crate::config::SplitConfig;
use crate::error::{DepFusionError, Result};
use crate::synthetic::class_indices;
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Which partition a participant belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partition {
    Train,
    Validation,
    Test,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Train => "train",
            Partition::Validation => "val",
            Partition::Test => "test",
        }
    }
}

/// Row indices of each partition, each list ascending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAssignment {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitAssignment {
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn indices(&self, partition: Partition) -> &[usize] {
        match partition {
            Partition::Train => &self.train,
            Partition::Validation => &self.val,
            Partition::Test => &self.test,
        }
    }

    /// Participant id to partition, given the row-aligned ids
    pub fn by_pid(&self, pids: &[i64]) -> BTreeMap<i64, Partition> {
        let mut map = BTreeMap::new();
        for (partition, rows) in [
            (Partition::Train, &self.train),
            (Partition::Validation, &self.val),
            (Partition::Test, &self.test),
        ] {
            for &row in rows {
                map.insert(pids[row], partition);
            }
        }
        map
    }
}

/// Two-stage stratified splitter
///
/// Stage one carves the test set off the full population; stage two carves
/// validation off the remainder at `val / (1 - test)` so both fractions hold
/// over the whole population.
#[derive(Debug, Clone, Default)]
pub struct SplitManager {
    config: SplitConfig,
}

impl SplitManager {
    pub fn new(config: SplitConfig) -> Self {
        Self { config }
    }

    pub fn split(&self, labels: &Array1<u8>) -> Result<SplitAssignment> {
        let all: Vec<usize> = (0..labels.len()).collect();
        let test_fraction = self.config.test_fraction;
        let val_of_rest = self.config.val_fraction / (1.0 - test_fraction);

        let (rest, test) = self.stratified_take(&all, labels, test_fraction, "test")?;
        let (train, val) = self.stratified_take(&rest, labels, val_of_rest, "validation")?;

        let assignment = SplitAssignment { train, val, test };
        info!(
            train = assignment.train.len(),
            val = assignment.val.len(),
            test = assignment.test.len(),
            seed = self.config.seed,
            "Stratified split"
        );
        Ok(assignment)
    }

    /// Split `pool` into (kept, taken) with `ceil(fraction * |pool|)` taken,
    /// allocated across classes by largest remainder
    fn stratified_take(
        &self,
        pool: &[usize],
        labels: &Array1<u8>,
        fraction: f64,
        stage: &str,
    ) -> Result<(Vec<usize>, Vec<usize>)> {
        let n = pool.len();
        let pool_labels: Array1<u8> = pool.iter().map(|&i| labels[i]).collect();
        let mut by_class: BTreeMap<u8, Vec<usize>> = class_indices(&pool_labels)
            .into_iter()
            .map(|(class, local)| (class, local.into_iter().map(|j| pool[j]).collect()))
            .collect();

        if by_class.len() < 2 {
            return Err(DepFusionError::ConfigError(format!(
                "Cannot stratify the {} split: only one class present",
                stage
            )));
        }
        if let Some((class, members)) = by_class.iter().find(|(_, m)| m.len() < 2) {
            return Err(DepFusionError::ConfigError(format!(
                "Cannot stratify the {} split: class {} has {} member(s), need at least 2",
                stage,
                class,
                members.len()
            )));
        }

        // Tolerance keeps 0.15 / 0.85 * 85 from rounding up to 16
        let n_take = (fraction * n as f64 - 1e-9).ceil() as usize;
        if n_take < by_class.len() || n - n_take < by_class.len() {
            return Err(DepFusionError::ConfigError(format!(
                "Cannot stratify the {} split: {} of {} rows leaves a side without every class",
                stage, n_take, n
            )));
        }

        // Largest-remainder allocation of n_take across classes
        let quotas: Vec<(u8, f64)> = by_class
            .iter()
            .map(|(&c, m)| (c, n_take as f64 * m.len() as f64 / n as f64))
            .collect();
        let mut alloc: BTreeMap<u8, usize> = quotas.iter().map(|&(c, q)| (c, q.floor() as usize)).collect();
        let mut left = n_take - alloc.values().sum::<usize>();
        let mut by_remainder = quotas.clone();
        by_remainder.sort_by(|a, b| {
            let fa = a.1 - a.1.floor();
            let fb = b.1 - b.1.floor();
            fb.total_cmp(&fa).then(a.0.cmp(&b.0))
        });
        for (class, _) in by_remainder.iter().cycle() {
            if left == 0 {
                break;
            }
            let members = by_class[class].len();
            if let Some(slot) = alloc.get_mut(class) {
                if *slot < members - 1 {
                    *slot += 1;
                    left -= 1;
                }
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut kept = Vec::with_capacity(n - n_take);
        let mut taken = Vec::with_capacity(n_take);
        for (class, members) in by_class.iter_mut() {
            members.shuffle(&mut rng);
            let k = alloc[class];
            taken.extend_from_slice(&members[..k]);
            kept.extend_from_slice(&members[k..]);
        }
        kept.sort_unstable();
        taken.sort_unstable();
        Ok((kept, taken))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn labels(n: usize, every: usize) -> Array1<u8> {
        Array1::from_shape_fn(n, |i| u8::from(i % every == 0))
    }

    #[test]
    fn test_partition_is_disjoint_cover() {
        let y = labels(100, 4);
        let split = SplitManager::default().split(&y).unwrap();

        let all: BTreeSet<usize> = split
            .train
            .iter()
            .chain(split.val.iter())
            .chain(split.test.iter())
            .copied()
            .collect();
        assert_eq!(all.len(), 100);
        assert_eq!(split.len(), 100);
        assert_eq!(split.test.len(), 15);
        assert_eq!(split.val.len(), 15);
        assert_eq!(split.train.len(), 70);
    }

    #[test]
    fn test_label_proportions_preserved() {
        let y = labels(120, 3);
        let split = SplitManager::default().split(&y).unwrap();
        let overall = 40.0 / 120.0;
        for part in [&split.train, &split.val, &split.test] {
            let pos = part.iter().filter(|&&i| y[i] == 1).count() as f64;
            let rate = pos / part.len() as f64;
            assert!((rate - overall).abs() < 0.05, "rate {} drifted from {}", rate, overall);
        }
    }

    #[test]
    fn test_split_is_seed_deterministic() {
        let y = labels(60, 3);
        let a = SplitManager::default().split(&y).unwrap();
        let b = SplitManager::default().split(&y).unwrap();
        assert_eq!(a, b);

        let other = SplitManager::new(SplitConfig { seed: 7, ..SplitConfig::default() })
            .split(&y)
            .unwrap();
        assert_ne!(a.test, other.test);
    }

    #[test]
    fn test_too_few_minority_is_config_error() {
        let mut y = Array1::zeros(30);
        y[0] = 1;
        let err = SplitManager::default().split(&y).unwrap_err();
        assert!(matches!(err, DepFusionError::ConfigError(_)));
    }

    #[test]
    fn test_by_pid() {
        let y = labels(20, 2);
        let split = SplitManager::default().split(&y).unwrap();
        let pids: Vec<i64> = (300..320).collect();
        let map = split.by_pid(&pids);
        assert_eq!(map.len(), 20);
        for &i in &split.test {
            assert_eq!(map[&pids[i]], Partition::Test);
        }
    }
}
