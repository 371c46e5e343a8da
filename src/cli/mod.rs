//! depfusion CLI Module
//!
//! Command-line interface for label building, feature extraction, the
//! training pipeline and the scoring server.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::data::{LabelBuilder, LabelTable};
use crate::extract::{FeatureExtractor, FsDataSource};
use crate::pipeline::{Pipeline, PipelineReport};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn line_box_empty() { line_box(""); }

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    println!("  {} {}...", accent("›"), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "depfusion")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multimodal depression-risk fusion: training pipeline and scoring API")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train, calibrate and evaluate every modality and fusion variant
    Run {
        /// JSON pipeline configuration (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory with master_labels.csv and the feature tables
        #[arg(long)]
        features_dir: Option<PathBuf>,

        /// Output directory for model artifacts
        #[arg(long)]
        models_dir: Option<PathBuf>,

        /// Output directory for metrics and chart data
        #[arg(long)]
        results_dir: Option<PathBuf>,
    },

    /// Build master_labels.csv from the corpus split tables
    Labels {
        /// Directory holding train_split.csv and dev_split.csv
        #[arg(long, default_value = "data/labels")]
        labels_dir: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "data/features")]
        out: PathBuf,
    },

    /// Extract text, audio and visual feature tables from raw recordings
    Extract {
        /// Corpus root containing `{pid}_P/` directories
        #[arg(long, default_value = "data/raw")]
        data_root: PathBuf,

        /// Master label table listing the participants to extract
        #[arg(long, default_value = "data/features/master_labels.csv")]
        labels: PathBuf,

        /// Output directory for the feature tables
        #[arg(short, long, default_value = "data/features")]
        out: PathBuf,
    },

    /// Start the scoring server
    Serve {
        /// Server host
        #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Server port
        #[arg(short, long, env = "API_PORT", default_value = "5000")]
        port: u16,

        /// Directory holding text_model.json and text_scaler.json
        #[arg(long, env = "MODELS_DIR", default_value = "models")]
        models_dir: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

/// Resolve the pipeline configuration from a file, env and flags
pub fn pipeline_config(
    config: Option<&Path>,
    features_dir: Option<PathBuf>,
    models_dir: Option<PathBuf>,
    results_dir: Option<PathBuf>,
) -> anyhow::Result<PipelineConfig> {
    let mut cfg = match config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::from_env(),
    };
    if let Some(dir) = features_dir {
        cfg = cfg.with_features_dir(dir);
    }
    if let Some(dir) = models_dir {
        cfg = cfg.with_models_dir(dir);
    }
    if let Some(dir) = results_dir {
        cfg = cfg.with_results_dir(dir);
    }
    cfg.validate()?;
    Ok(cfg)
}

pub fn cmd_run(config: PipelineConfig) -> anyhow::Result<PipelineReport> {
    section("Pipeline");
    println!("  {}", kv("features", &config.features_dir.display().to_string()));
    println!("  {}", kv("models  ", &config.models_dir.display().to_string()));
    println!("  {}", kv("results ", &config.results_dir.display().to_string()));
    println!();

    step_run("Training and evaluating");
    let report = Pipeline::new(config).run()?;
    step_ok(&format!(
        "{} participants ({} train / {} val / {} test) in {:.1}s",
        report.n_participants, report.n_train, report.n_val, report.n_test, report.elapsed_secs
    ));

    print_summary(&report);
    Ok(report)
}

fn print_summary(report: &PipelineReport) {
    section("Late fusion weights");
    for (modality, weight) in report.late_fusion.weights.iter() {
        let auc = report.late_fusion.validation_auc.get(&modality).copied().unwrap_or(0.0);
        println!(
            "  {:<10} {:>8} {}",
            modality.display_name(),
            format!("{:.3}", weight).white(),
            dim(&format!("val AUC {:.3}", auc))
        );
    }
    if report.late_fusion.fallback {
        println!("  {}", "no modality cleared the relevance bar, using raw weights".yellow());
    }

    section("Test results");
    println!(
        "  {:<24} {:>8} {:>8} {:>8} {:>8} {:>8}",
        muted("Model"), muted("Acc"), muted("F1"), muted("Prec"), muted("Recall"), muted("AUC")
    );
    println!("  {}", dim(&"─".repeat(70)));
    let best = report.evaluation.best_by_f1().map(|r| r.variant);
    for r in &report.evaluation.results {
        let name = if Some(r.variant) == best {
            r.variant.display_name().white().bold()
        } else {
            r.variant.display_name().normal()
        };
        println!(
            "  {:<24} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4}",
            name, r.report.accuracy, r.report.f1, r.report.precision, r.report.recall, r.report.auc
        );
    }
    println!("  {}", dim(&"─".repeat(70)));
    if let Some(best) = report.evaluation.best_by_f1() {
        println!();
        println!(
            "  {} {} {} {:.4}",
            ok("best"),
            best.variant.display_name().white().bold(),
            muted("F1:"),
            best.report.f1
        );
    }
    println!();
}

pub fn cmd_labels(labels_dir: &Path, out: &Path) -> anyhow::Result<LabelTable> {
    section("Labels");
    step_run(&format!("Reading split tables from {}", labels_dir.display()));
    let table = LabelBuilder::new(labels_dir).build_and_write(out)?;
    step_ok(&format!(
        "{} participants, {} depressed → {}",
        table.len(),
        table.n_positive(),
        out.join("master_labels.csv").display()
    ));
    println!();
    Ok(table)
}

pub fn cmd_extract(data_root: &Path, labels: &Path, out: &Path) -> anyhow::Result<()> {
    section("Extract");
    let table = LabelTable::read(labels)?;
    step_run(&format!("Extracting features for {} participants", table.len()));
    let start = Instant::now();

    std::fs::create_dir_all(out)?;
    let source = FsDataSource::new(data_root);
    let summary = FeatureExtractor::new(&source, out).run(&table.pids)?;

    step_ok(&format!("text   {} rows", summary.text));
    step_ok(&format!("audio  {} rows", summary.audio));
    step_ok(&format!("visual {} rows", summary.visual));
    println!("  {}", dim(&format!("{:.2?}", start.elapsed())));
    println!();
    Ok(())
}

pub async fn cmd_serve(host: &str, port: u16, models_dir: PathBuf) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    println!();
    line_box_top();
    line_box_empty();
    line_box_center(&format!("{}", "depfusion".white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box(&kv("Health ", &format!("http://{}:{}/health", host, port)));
    line_box(&kv("Models ", &models_dir.display().to_string()));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box_center(&format!("{}", dim("ctrl+c to stop")));
    line_box_empty();
    line_box_bottom();
    println!();

    let config = ServerConfig {
        host: host.to_string(),
        port,
        models_dir,
    };

    run_server(config).await
}
