//! Frame-level audio and visual descriptors collapsed to per-participant
//! statistics

use super::{numeric_columns, AudioStream, DataSource, FeatureRecord};
use crate::error::Result;
use polars::prelude::*;
use tracing::{info, warn};

/// Mean, sample standard deviation, min and max of the present values
///
/// Every statistic is 0 when no value is present; the standard deviation is
/// 0 for a single value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColumnStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl ColumnStats {
    pub fn compute(values: &[Option<f64>]) -> Self {
        let present: Vec<f64> = values
            .iter()
            .filter_map(|v| *v)
            .filter(|v| v.is_finite())
            .collect();
        if present.is_empty() {
            return Self::default();
        }
        let n = present.len() as f64;
        let mean = present.iter().sum::<f64>() / n;
        let std = if present.len() > 1 {
            (present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        let min = present.iter().copied().fold(f64::INFINITY, f64::min);
        let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self { mean, std, min, max }
    }
}

fn is_audio_metadata(column: &str) -> bool {
    column == "name" || column == "frameTime" || column.to_lowercase().contains("unknown")
}

/// Concatenated means, stds, mins and maxes of one descriptor stream
pub fn aggregate_stream(df: &DataFrame) -> Result<Option<Vec<f64>>> {
    if df.height() == 0 {
        return Ok(None);
    }
    let columns: Vec<(String, Vec<Option<f64>>)> = numeric_columns(df)?
        .into_iter()
        .filter(|(name, _)| !is_audio_metadata(name))
        .collect();
    if columns.is_empty() {
        return Ok(None);
    }
    let stats: Vec<ColumnStats> = columns.iter().map(|(_, v)| ColumnStats::compute(v)).collect();
    let mut out = Vec::with_capacity(stats.len() * 4);
    out.extend(stats.iter().map(|s| s.mean));
    out.extend(stats.iter().map(|s| s.std));
    out.extend(stats.iter().map(|s| s.min));
    out.extend(stats.iter().map(|s| s.max));
    Ok(Some(out))
}

/// Aggregates both openSMILE streams per participant
#[derive(Debug, Clone, Default)]
pub struct AudioAggregator;

impl AudioAggregator {
    pub fn extract(&self, source: &dyn DataSource, pids: &[i64]) -> Result<Vec<FeatureRecord>> {
        let mut records = Vec::new();
        let mut missing = Vec::new();

        for &pid in pids {
            let mut values = Vec::new();
            let mut found = false;
            for stream in AudioStream::ALL {
                let Some(df) = source.audio_frames(pid, stream)? else {
                    continue;
                };
                found = true;
                if let Some(vec) = aggregate_stream(&df)? {
                    values.extend(
                        vec.into_iter()
                            .enumerate()
                            .map(|(i, v)| (format!("{}_{}", stream.prefix(), i), v)),
                    );
                }
            }
            if !found {
                missing.push(pid);
                continue;
            }
            records.push(FeatureRecord { pid, values });
        }

        if !missing.is_empty() {
            warn!(count = missing.len(), pids = ?missing, "Missing audio descriptors");
        }
        info!(participants = records.len(), "Extracted audio features");
        Ok(records)
    }
}

/// Frame quality gate for facial descriptors
const MIN_CONFIDENCE: f64 = 0.80;

/// Facial action unit, head pose and gaze columns in group order
fn visual_columns(names: &[String]) -> (Vec<String>, Vec<String>) {
    let au_r: Vec<&String> = names.iter().filter(|c| c.contains("AU") && c.contains("_r")).collect();
    let au_c: Vec<String> = names
        .iter()
        .filter(|c| c.contains("AU") && c.contains("_c"))
        .cloned()
        .collect();
    let pose = names.iter().filter(|c| c.contains("pose_"));
    let gaze = names.iter().filter(|c| c.contains("gaze_"));

    let mut ordered: Vec<String> = Vec::new();
    for c in au_r.into_iter().chain(au_c.iter()).chain(pose).chain(gaze) {
        if !ordered.contains(c) {
            ordered.push(c.clone());
        }
    }
    (ordered, au_c)
}

/// Summarises OpenFace frames per participant
#[derive(Debug, Clone)]
pub struct VisualAggregator {
    min_confidence: f64,
}

impl Default for VisualAggregator {
    fn default() -> Self {
        Self {
            min_confidence: MIN_CONFIDENCE,
        }
    }
}

impl VisualAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-column statistics over confident, successfully tracked frames
    pub fn summarize(&self, df: &DataFrame) -> Result<Option<Vec<(String, f64)>>> {
        let columns = numeric_columns(df)?;
        let lookup = |name: &str| columns.iter().find(|(n, _)| n == name).map(|(_, v)| v);

        let keep: Vec<bool> = (0..df.height())
            .map(|row| {
                let confident = lookup("confidence")
                    .map_or(true, |c| c[row].map_or(false, |v| v >= self.min_confidence));
                let tracked = lookup("success").map_or(true, |s| s[row] == Some(1.0));
                confident && tracked
            })
            .collect();

        let names: Vec<String> = columns.iter().map(|(n, _)| n.clone()).collect();
        let (selected, presence) = visual_columns(&names);
        if selected.is_empty() {
            return Ok(None);
        }

        let filtered = |values: &Vec<Option<f64>>| -> Vec<Option<f64>> {
            values
                .iter()
                .zip(keep.iter())
                .filter(|&(_, &k)| k)
                .map(|(v, _)| *v)
                .collect()
        };

        let mut out = Vec::with_capacity(selected.len() * 4 + presence.len());
        for col in &selected {
            if let Some(values) = lookup(col) {
                let s = ColumnStats::compute(&filtered(values));
                out.push((format!("{}_mean", col), s.mean));
                out.push((format!("{}_std", col), s.std));
                out.push((format!("{}_min", col), s.min));
                out.push((format!("{}_max", col), s.max));
            }
        }
        for col in &presence {
            if let Some(values) = lookup(col) {
                let s = ColumnStats::compute(&filtered(values));
                out.push((format!("{}_pct_active", col), s.mean));
            }
        }
        Ok(Some(out))
    }

    pub fn extract(&self, source: &dyn DataSource, pids: &[i64]) -> Result<Vec<FeatureRecord>> {
        let mut records = Vec::new();
        let mut missing = Vec::new();

        for &pid in pids {
            let Some(df) = source.visual_frames(pid)? else {
                missing.push(pid);
                continue;
            };
            match self.summarize(&df)? {
                Some(values) => records.push(FeatureRecord { pid, values }),
                None => warn!(pid, "No facial descriptor columns, skipping"),
            }
        }

        if !missing.is_empty() {
            warn!(count = missing.len(), pids = ?missing, "Missing facial descriptors");
        }
        info!(participants = records.len(), "Extracted visual features");
        Ok(records)
    }
}
