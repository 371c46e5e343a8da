//! Feature store: labels joined with the three modality tables

use crate::data::labels::LabelTable;
use crate::data::{columns_to_array2, pid_column, read_csv, Modality, PID_COLUMN};
use crate::error::{DepFusionError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Feature matrix of one modality with its column names
#[derive(Debug, Clone, PartialEq)]
pub struct ModalityMatrix {
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

impl ModalityMatrix {
    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self, indices: &[usize]) -> Array2<f64> {
        self.values.select(Axis(0), indices)
    }
}

/// Participants present in the label table and all three feature tables
///
/// Row `i` of every matrix belongs to `pids[i]`; the order is the label
/// table's order.
#[derive(Debug, Clone)]
pub struct MergedDataset {
    pub pids: Vec<i64>,
    pub labels: Array1<u8>,
    pub text: ModalityMatrix,
    pub audio: ModalityMatrix,
    pub visual: ModalityMatrix,
}

impl MergedDataset {
    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn modality(&self, modality: Modality) -> &ModalityMatrix {
        match modality {
            Modality::Text => &self.text,
            Modality::Audio => &self.audio,
            Modality::Visual => &self.visual,
        }
    }

    /// Inner-join labels with the three feature tables on `pid`
    pub fn from_frames(
        labels: &LabelTable,
        text: &DataFrame,
        audio: &DataFrame,
        visual: &DataFrame,
    ) -> Result<Self> {
        let tables = [(Modality::Text, text), (Modality::Audio, audio), (Modality::Visual, visual)];

        let mut row_maps = Vec::with_capacity(3);
        for (modality, df) in &tables {
            let mut map: HashMap<i64, usize> = HashMap::new();
            for (row, pid) in pid_column(df, PID_COLUMN)?.into_iter().enumerate() {
                if let Some(pid) = pid {
                    map.entry(pid).or_insert(row);
                }
            }
            info!(modality = %modality, rows = df.height(), "Loaded feature table");
            row_maps.push(map);
        }

        let mut pids = Vec::new();
        let mut kept_labels = Vec::new();
        let mut picks: [Vec<usize>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for (&pid, &label) in labels.pids.iter().zip(labels.labels.iter()) {
            let rows: Option<Vec<usize>> = row_maps.iter().map(|m| m.get(&pid).copied()).collect();
            if let Some(rows) = rows {
                pids.push(pid);
                kept_labels.push(label);
                for (k, row) in rows.into_iter().enumerate() {
                    picks[k].push(row);
                }
            }
        }

        if pids.is_empty() {
            return Err(DepFusionError::DataError(
                "No participant appears in the labels and all three feature tables".to_string(),
            ));
        }

        let mut matrices = Vec::with_capacity(3);
        for ((modality, df), rows) in tables.iter().zip(picks.iter()) {
            let columns: Vec<String> = df
                .get_column_names()
                .iter()
                .map(|s| s.to_string())
                .filter(|c| c != PID_COLUMN && modality.owns_column(c))
                .collect();
            if columns.is_empty() {
                return Err(DepFusionError::DataError(format!(
                    "{} table has no recognised feature columns",
                    modality
                )));
            }
            let full = columns_to_array2(df, &columns)?;
            matrices.push(ModalityMatrix {
                columns,
                values: full.select(Axis(0), rows),
            });
        }

        let visual = matrices.pop().ok_or_else(|| DepFusionError::DataError("visual".into()))?;
        let audio = matrices.pop().ok_or_else(|| DepFusionError::DataError("audio".into()))?;
        let text = matrices.pop().ok_or_else(|| DepFusionError::DataError("text".into()))?;

        Ok(Self {
            pids,
            labels: Array1::from_vec(kept_labels),
            text,
            audio,
            visual,
        })
    }
}

/// Reads `master_labels.csv` and the three feature tables from one directory
#[derive(Debug, Clone)]
pub struct FeatureStore {
    features_dir: PathBuf,
}

impl FeatureStore {
    pub fn new(features_dir: impl Into<PathBuf>) -> Self {
        Self {
            features_dir: features_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.features_dir
    }

    pub fn labels_path(&self) -> PathBuf {
        self.features_dir.join("master_labels.csv")
    }

    pub fn table_path(&self, modality: Modality) -> PathBuf {
        self.features_dir.join(modality.table_file())
    }

    pub fn load(&self) -> Result<MergedDataset> {
        let labels = LabelTable::read(&self.labels_path())?;
        let text = read_csv(&self.table_path(Modality::Text), b',')?;
        let audio = read_csv(&self.table_path(Modality::Audio), b',')?;
        let visual = read_csv(&self.table_path(Modality::Visual), b',')?;

        let merged = MergedDataset::from_frames(&labels, &text, &audio, &visual)?;
        let dropped = labels.len() - merged.len();
        if dropped > 0 {
            warn!(dropped, "Participants without all three modalities were left out");
        }
        info!(
            participants = merged.len(),
            depressed = merged.labels.iter().filter(|&&l| l == 1).count(),
            text_features = merged.text.n_features(),
            audio_features = merged.audio.n_features(),
            visual_features = merged.visual.n_features(),
            "Merged feature store"
        );
        Ok(merged)
    }
}
