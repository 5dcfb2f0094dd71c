//! CLI entry point for the HEVC re-encode pipeline.
//!
//! Parses command line arguments, loads configuration, runs startup checks,
//! and drives one batch over the library root.

use clap::Parser;
use hevc_recode::config::Config;
use hevc_recode::{dry_run, run_batch, run_startup_checks};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

/// Batch re-encode of a video library to HEVC, replacing originals only
/// when the result is smaller and validated.
#[derive(Parser, Debug)]
#[command(name = "hevc-recode")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Library root directory to process
    root: PathBuf,

    /// Path to the configuration file (config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recurse into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Keep originals and place encodes beside them
    #[arg(long)]
    keep_original: bool,

    /// Stop starting new candidates after this many hours (0 = unlimited)
    #[arg(long)]
    time_budget_hours: Option<f64>,

    /// List the candidate queue without encoding or writing ledgers
    #[arg(long)]
    dry_run: bool,
}

fn load_config(args: &Args) -> Result<Config, String> {
    let mut config = match &args.config {
        Some(path) => Config::load(path).map_err(|e| e.to_string())?,
        None => {
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Flags win over file and environment.
    if args.recursive {
        config.library.recursive = true;
    }
    if args.keep_original {
        config.behavior.keep_original = true;
    }
    if let Some(hours) = args.time_budget_hours {
        config.behavior.time_budget_hours = hours;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if !args.dry_run {
        if let Err(e) = run_startup_checks() {
            error!("Startup check failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let result = if args.dry_run {
        dry_run(&args.root, &config).await
    } else {
        run_batch(&args.root, &config).await
    };

    match result {
        Ok(summary) => {
            println!(
                "Processed {} candidates: {} replaced ({} bytes saved), {} retained larger, \
                 {} fast skips, {} insufficient benefit, {} failures, {} to retry, {} deferred",
                summary.candidates,
                summary.replaced,
                summary.bytes_saved,
                summary.retained_larger,
                summary.fast_skipped,
                summary.skipped_insufficient,
                summary.failures,
                summary.retriable,
                summary.deferred,
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Batch run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
