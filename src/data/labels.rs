//! Label table construction
//!
//! Split tables from the corpus name their columns inconsistently, so the
//! participant and score columns are resolved from ordered candidate lists
//! before anything is read.

use crate::data::{column_f64, pid_column, read_csv, write_csv, PID_COLUMN};
use crate::error::{DepFusionError, Result};
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Questionnaire total at or above which a participant is labelled positive
pub const DEPRESSION_CUTOFF: f64 = 10.0;

/// Binary depression label for a questionnaire total
pub fn binarize_score(score: f64) -> u8 {
    u8::from(score >= DEPRESSION_CUTOFF)
}

/// Ordered column-name candidates for the label table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelSchema {
    pub id_candidates: Vec<String>,
    pub score_candidates: Vec<String>,
}

impl Default for LabelSchema {
    fn default() -> Self {
        Self {
            id_candidates: ["Participant_ID", "participant_id", "ID", "id", "SubjectID"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            score_candidates: ["PHQ_Score", "PHQ8_Score", "phq_score", "PHQ8", "phq8", "Score"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Column names chosen by [`LabelSchema::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchema {
    pub id_column: String,
    pub score_column: String,
}

impl LabelSchema {
    /// First candidate present in `columns`, for each field
    pub fn resolve<S: AsRef<str>>(&self, columns: &[S]) -> Result<ResolvedSchema> {
        let pick = |candidates: &[String], field: &'static str| {
            candidates
                .iter()
                .find(|c| columns.iter().any(|col| col.as_ref() == c.as_str()))
                .cloned()
                .ok_or_else(|| DepFusionError::LabelSchema {
                    field,
                    available: columns.iter().map(|c| c.as_ref().to_string()).collect(),
                })
        };
        Ok(ResolvedSchema {
            id_column: pick(&self.id_candidates, "participant id")?,
            score_column: pick(&self.score_candidates, "score")?,
        })
    }
}

/// Participant ids with raw scores and binary labels, in table order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTable {
    pub pids: Vec<i64>,
    pub scores: Vec<f64>,
    pub labels: Vec<u8>,
}

impl LabelTable {
    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn n_positive(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    pub fn labels_array(&self) -> Array1<u8> {
        Array1::from_vec(self.labels.clone())
    }

    /// Extract ids and scores from a raw split table
    pub fn from_frame(df: &DataFrame, schema: &LabelSchema) -> Result<Self> {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let resolved = schema.resolve(&names)?;

        let ids = pid_column(df, &resolved.id_column)?;
        let score_col = df.column(&resolved.score_column)?.cast(&DataType::Float64)?;
        let scores: Vec<Option<f64>> = score_col
            .as_materialized_series()
            .f64()?
            .into_iter()
            .collect();

        let mut table = Self::default();
        let mut dropped = 0usize;
        for (id, score) in ids.into_iter().zip(scores) {
            match (id, score) {
                (Some(id), Some(score)) if score.is_finite() => {
                    table.pids.push(id);
                    table.scores.push(score);
                    table.labels.push(binarize_score(score));
                }
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            warn!(dropped, "Skipped label rows with a missing id or score");
        }
        Ok(table)
    }

    /// Read a `pid, phq_score, label` table written by [`LabelTable::write`]
    pub fn read(path: &Path) -> Result<Self> {
        let df = read_csv(path, b',')?;
        let pids = pid_column(&df, PID_COLUMN)?;
        let scores = column_f64(&df, "phq_score")?;
        let labels = column_f64(&df, "label")?;

        let mut table = Self::default();
        for ((id, score), label) in pids.into_iter().zip(scores).zip(labels) {
            if let Some(id) = id {
                table.pids.push(id);
                table.scores.push(score);
                table.labels.push(u8::from(label >= 0.5));
            }
        }
        Ok(table)
    }

    pub fn to_frame(&self) -> Result<DataFrame> {
        let labels: Vec<i32> = self.labels.iter().map(|&l| l as i32).collect();
        Ok(DataFrame::new(vec![
            Series::new(PID_COLUMN.into(), self.pids.clone()).into(),
            Series::new("phq_score".into(), self.scores.clone()).into(),
            Series::new("label".into(), labels).into(),
        ])?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut df = self.to_frame()?;
        write_csv(&mut df, path)
    }
}

/// Builds the master label table from the corpus split files
#[derive(Debug, Clone)]
pub struct LabelBuilder {
    labels_dir: PathBuf,
    split_files: Vec<String>,
    schema: LabelSchema,
}

impl LabelBuilder {
    pub fn new(labels_dir: impl Into<PathBuf>) -> Self {
        Self {
            labels_dir: labels_dir.into(),
            split_files: vec!["train_split.csv".to_string(), "dev_split.csv".to_string()],
            schema: LabelSchema::default(),
        }
    }

    pub fn with_split_files(mut self, files: Vec<String>) -> Self {
        self.split_files = files;
        self
    }

    pub fn with_schema(mut self, schema: LabelSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Concatenate every available split table into one label table
    pub fn build(&self) -> Result<LabelTable> {
        let mut table = LabelTable::default();
        let mut found = 0usize;

        for file in &self.split_files {
            let path = self.labels_dir.join(file);
            if !path.exists() {
                warn!(path = %path.display(), "Label split file not found, skipping");
                continue;
            }
            let df = read_csv(&path, b',')?;
            let part = LabelTable::from_frame(&df, &self.schema)?;
            info!(file = %file, rows = part.len(), "Loaded label split");
            table.pids.extend(part.pids);
            table.scores.extend(part.scores);
            table.labels.extend(part.labels);
            found += 1;
        }

        if found == 0 {
            return Err(DepFusionError::DataError(format!(
                "No label split files found under {}",
                self.labels_dir.display()
            )));
        }

        let n_pos = table.n_positive();
        let n_neg = table.len() - n_pos;
        info!(
            participants = table.len(),
            depressed = n_pos,
            not_depressed = n_neg,
            imbalance_ratio = if n_pos > 0 { n_neg as f64 / n_pos as f64 } else { f64::INFINITY },
            "Built label table"
        );
        Ok(table)
    }

    /// Build and write `master_labels.csv` under `out_dir`
    pub fn build_and_write(&self, out_dir: &Path) -> Result<LabelTable> {
        let table = self.build()?;
        table.write(&out_dir.join("master_labels.csv"))?;
        Ok(table)
    }
}
