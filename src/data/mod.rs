//! Participant-indexed tables: labels, modality features, and the merged
//! dataset the pipeline trains on.

pub mod labels;
pub mod store;

pub use labels::{binarize_score, LabelBuilder, LabelSchema, LabelTable, ResolvedSchema};
pub use store::{FeatureStore, MergedDataset, ModalityMatrix};

use crate::error::{DepFusionError, Result};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Participant key column in every feature table
pub const PID_COLUMN: &str = "pid";

/// The three signal sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Modality {
    Text,
    Audio,
    Visual,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Text, Modality::Audio, Modality::Visual];

    /// Artifact and log name
    pub fn name(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Audio => "audio",
            Modality::Visual => "visual",
        }
    }

    /// Row label in the comparison table
    pub fn display_name(&self) -> &'static str {
        match self {
            Modality::Text => "Text Only",
            Modality::Audio => "Audio Only",
            Modality::Visual => "Visual Only",
        }
    }

    /// Feature table file name under the features directory
    pub fn table_file(&self) -> &'static str {
        match self {
            Modality::Text => "text_features.csv",
            Modality::Audio => "audio_features.csv",
            Modality::Visual => "visual_features.csv",
        }
    }

    /// Whether a column of this modality's table is a feature column
    pub fn owns_column(&self, column: &str) -> bool {
        match self {
            Modality::Text => ["sent_", "word_", "unique_", "lexical_", "avg_", "tfidf_"]
                .iter()
                .any(|p| column.starts_with(p)),
            Modality::Audio => column.starts_with("mfcc_") || column.starts_with("egemap_"),
            Modality::Visual => {
                column.contains("AU") || column.contains("pose_") || column.contains("gaze_")
            }
        }
    }

    /// Reduced by PCA before training
    pub fn is_high_dimensional(&self) -> bool {
        matches!(self, Modality::Audio | Modality::Visual)
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Read a headed CSV with the given field separator
pub fn read_csv(path: &Path, separator: u8) -> Result<DataFrame> {
    let parse_opts = CsvParseOptions::default().with_separator(separator);
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .with_parse_options(parse_opts)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file).finish(df)?;
    Ok(())
}

/// One column as f64 values, nulls and NaNs mapped to 0
pub fn column_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| DepFusionError::FeatureNotFound(name.to_string()))?;
    let cast = column.cast(&DataType::Float64)?;
    let values = cast
        .as_materialized_series()
        .f64()?
        .into_iter()
        .map(|v| match v {
            Some(x) if x.is_finite() => x,
            _ => 0.0,
        })
        .collect();
    Ok(values)
}

/// Named columns gathered into a row-major matrix
pub fn columns_to_array2(df: &DataFrame, names: &[String]) -> Result<Array2<f64>> {
    let col_data: Vec<Vec<f64>> = names
        .iter()
        .map(|name| column_f64(df, name))
        .collect::<Result<_>>()?;
    Ok(Array2::from_shape_fn((df.height(), names.len()), |(r, c)| col_data[c][r]))
}

/// Participant ids of a table as integers
pub fn pid_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let column = df
        .column(name)
        .map_err(|_| DepFusionError::FeatureNotFound(name.to_string()))?;
    let cast = column.cast(&DataType::Int64)?;
    Ok(cast.as_materialized_series().i64()?.into_iter().collect())
}
