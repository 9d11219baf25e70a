//! vision-pipeline - run a linear video pipeline with frame descriptions
//!
//! # Usage
//!
//! ```bash
//! # Built-in demo chain (live test pattern, one description every 5 s)
//! GST_GEMINI_API_KEY=... cargo run --release
//!
//! # Custom chain
//! GST_GEMINI_API_KEY=... ./vision-pipeline --config pipeline.toml
//!
//! # Show the effective configuration and exit
//! ./vision-pipeline --print-config
//! ```
//!
//! # Environment Variables
//!
//! - `GST_GEMINI_API_KEY`: API credential (required to run)
//! - `VISION_PIPELINE_CONFIG`: Path to the pipeline TOML file
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use vision_pipeline::app::{self, EXIT_USAGE};
use vision_pipeline::config::{defaults::CONFIG_PATH_ENV_VAR, PipelineConfig};
use vision_pipeline::pipeline::LoggingObserver;
use vision_pipeline::stage::builtin;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "vision-pipeline")]
#[command(about = "Linear video pipeline with out-of-band frame descriptions")]
#[command(version)]
struct CliArgs {
    /// Path to the pipeline TOML file
    /// (default: $VISION_PIPELINE_CONFIG, then ./pipeline.toml, then the demo chain)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn load_config(args: &CliArgs) -> anyhow::Result<PipelineConfig> {
    let (config, source) = PipelineConfig::load(args.config.as_deref())
        .with_context(|| format!("failed to load pipeline configuration (see --config, {CONFIG_PATH_ENV_VAR})"))?;
    info!(source = %source, pipeline = %config.pipeline.name, stages = config.stages.len(), "Configuration loaded");
    Ok(config)
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if args.print_config {
        return match config.to_toml() {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Failed to render configuration");
                ExitCode::from(EXIT_USAGE)
            }
        };
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Vision Pipeline");
    info!("  Pipeline: {}", config.pipeline.name);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Graceful shutdown via Ctrl+C
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let registry = builtin::registry();
    let code = match app::run(
        &config,
        &registry,
        |var| std::env::var(var).ok(),
        LoggingObserver,
        interrupt,
    )
    .await
    {
        Ok(report) => report.exit_code(),
        Err(e) => {
            error!(error = %e, stage = e.stage().unwrap_or("-"), "Pipeline failed");
            app::EXIT_FAILURE
        }
    };
    ExitCode::from(code)
}
