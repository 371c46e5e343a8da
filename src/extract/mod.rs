//! Raw recordings to per-participant feature tables
//!
//! A [`DataSource`] hands out the per-participant frames; the extractors
//! collapse them into one row per participant and [`FeatureExtractor`]
//! writes the three modality tables the pipeline reads.

pub mod aggregate;
pub mod sentiment;
pub mod text;

pub use aggregate::{aggregate_stream, AudioAggregator, ColumnStats, VisualAggregator};
pub use sentiment::{SentimentAnalyzer, SentimentScores};
pub use text::{
    TextCleaner, TextExtractor, TextFeatures, TfidfVectorizer, TranscriptText, BASE_FEATURE_NAMES,
    MIN_TEXT_CHARS, PLACEHOLDER_TEXT,
};

use crate::data::{read_csv, write_csv, Modality, PID_COLUMN};
use crate::error::Result;
use polars::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// openSMILE descriptor streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioStream {
    Mfcc,
    Egemaps,
}

impl AudioStream {
    pub const ALL: [AudioStream; 2] = [AudioStream::Mfcc, AudioStream::Egemaps];

    /// File name suffix
    pub fn suffix(&self) -> &'static str {
        match self {
            AudioStream::Mfcc => "mfcc",
            AudioStream::Egemaps => "egemaps",
        }
    }

    /// Output column prefix
    pub fn prefix(&self) -> &'static str {
        match self {
            AudioStream::Mfcc => "mfcc",
            AudioStream::Egemaps => "egemap",
        }
    }
}

/// Per-participant raw frames; `None` when the participant has no such file
pub trait DataSource: Send + Sync {
    fn transcript(&self, pid: i64) -> Result<Option<DataFrame>>;
    fn audio_frames(&self, pid: i64, stream: AudioStream) -> Result<Option<DataFrame>>;
    fn visual_frames(&self, pid: i64) -> Result<Option<DataFrame>>;
}

/// Corpus laid out as `{root}/{pid}_P/...`
#[derive(Debug, Clone)]
pub struct FsDataSource {
    root: PathBuf,
}

impl FsDataSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn participant_dir(&self, pid: i64) -> PathBuf {
        self.root.join(format!("{}_P", pid))
    }

    pub fn transcript_path(&self, pid: i64) -> PathBuf {
        self.participant_dir(pid).join(format!("{}_Transcript.csv", pid))
    }

    pub fn audio_path(&self, pid: i64, stream: AudioStream) -> PathBuf {
        self.participant_dir(pid)
            .join("features")
            .join(format!("{}_OpenSMILE2.3.0_{}.csv", pid, stream.suffix()))
    }

    pub fn visual_path(&self, pid: i64) -> PathBuf {
        self.participant_dir(pid)
            .join("features")
            .join(format!("{}_OpenFace2.1.0_Pose_gaze_AUs.csv", pid))
    }

    fn read_if_present(path: &Path, separator: u8) -> Result<Option<DataFrame>> {
        if !path.exists() {
            return Ok(None);
        }
        let mut df = read_csv(path, separator)?;
        // OpenFace pads its header names with spaces
        let trimmed: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.trim().to_string())
            .collect();
        df.set_column_names(trimmed)?;
        Ok(Some(df))
    }
}

impl DataSource for FsDataSource {
    fn transcript(&self, pid: i64) -> Result<Option<DataFrame>> {
        Self::read_if_present(&self.transcript_path(pid), b',')
    }

    fn audio_frames(&self, pid: i64, stream: AudioStream) -> Result<Option<DataFrame>> {
        Self::read_if_present(&self.audio_path(pid, stream), b';')
    }

    fn visual_frames(&self, pid: i64) -> Result<Option<DataFrame>> {
        Self::read_if_present(&self.visual_path(pid), b',')
    }
}

/// Numeric columns of a frame table, in column order
pub fn numeric_columns(df: &DataFrame) -> Result<Vec<(String, Vec<Option<f64>>)>> {
    let mut out = Vec::new();
    for column in df.get_columns() {
        match column.dtype() {
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 |
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 |
            DataType::Float32 | DataType::Float64 => {
                let cast = column.cast(&DataType::Float64)?;
                let values = cast.as_materialized_series().f64()?.into_iter().collect();
                out.push((column.name().to_string(), values));
            }
            _ => {}
        }
    }
    Ok(out)
}

/// One participant's named feature values
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub pid: i64,
    pub values: Vec<(String, f64)>,
}

/// Union of records as a table: `pid` first, then columns in first-seen
/// order, absent cells filled with 0
pub fn records_to_frame(records: &[FeatureRecord]) -> Result<DataFrame> {
    let mut order: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        for (name, _) in &record.values {
            if !index.contains_key(name) {
                index.insert(name.clone(), order.len());
                order.push(name.clone());
            }
        }
    }

    let mut data = vec![vec![0.0f64; records.len()]; order.len()];
    for (row, record) in records.iter().enumerate() {
        for (name, value) in &record.values {
            data[index[name]][row] = if value.is_finite() { *value } else { 0.0 };
        }
    }

    let pids: Vec<i64> = records.iter().map(|r| r.pid).collect();
    let mut columns: Vec<Column> = Vec::with_capacity(order.len() + 1);
    columns.push(Series::new(PID_COLUMN.into(), pids).into());
    for (name, values) in order.iter().zip(data) {
        columns.push(Series::new(name.as_str().into(), values).into());
    }
    Ok(DataFrame::new(columns)?)
}

/// Rows written per modality table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub text: usize,
    pub audio: usize,
    pub visual: usize,
}

/// Runs all three extractors and writes their tables under `out_dir`
pub struct FeatureExtractor<'a> {
    source: &'a dyn DataSource,
    out_dir: PathBuf,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(source: &'a dyn DataSource, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            out_dir: out_dir.into(),
        }
    }

    fn write(&self, modality: Modality, records: &[FeatureRecord]) -> Result<usize> {
        let mut df = records_to_frame(records)?;
        let path = self.out_dir.join(modality.table_file());
        write_csv(&mut df, &path)?;
        info!(
            modality = %modality,
            rows = df.height(),
            columns = df.width(),
            path = %path.display(),
            "Wrote feature table"
        );
        Ok(df.height())
    }

    pub fn run(&self, pids: &[i64]) -> Result<ExtractionSummary> {
        let text = TextExtractor::new()?.extract(self.source, pids)?;
        let audio = AudioAggregator.extract(self.source, pids)?;
        let visual = VisualAggregator::new().extract(self.source, pids)?;

        Ok(ExtractionSummary {
            text: self.write(Modality::Text, &text)?,
            audio: self.write(Modality::Audio, &audio)?,
            visual: self.write(Modality::Visual, &visual)?,
        })
    }
}
