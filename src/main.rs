//! depfusion - Main Entry Point
//!
//! Batch training pipeline and scoring server for multimodal depression-risk
//! estimation.

use clap::Parser;
use depfusion::cli::{cmd_extract, cmd_labels, cmd_run, cmd_serve, pipeline_config, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "depfusion=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { config, features_dir, models_dir, results_dir }) => {
            let config = pipeline_config(config.as_deref(), features_dir, models_dir, results_dir)?;
            cmd_run(config)?;
        }
        Some(Commands::Labels { labels_dir, out }) => {
            cmd_labels(&labels_dir, &out)?;
        }
        Some(Commands::Extract { data_root, labels, out }) => {
            cmd_extract(&data_root, &labels, &out)?;
        }
        Some(Commands::Serve { host, port, models_dir }) => {
            cmd_serve(&host, port, models_dir).await?;
        }
        None => {
            // Default: the batch pipeline with default settings
            cmd_run(pipeline_config(None, None, None, None)?)?;
        }
    }

    Ok(())
}
