//! Database Capture Tool
//!
//! Dumps a database with pg_dump and ships the archive to tiered object storage

// dbcapture/src/main.rs
mod backup;
mod clock;
mod config;
mod errors;
mod storage;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::CaptureConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Capture a database dump and place it in tiered object storage
#[derive(Parser, Debug)]
#[command(name = "dbcapture")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print debug information
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture a database dump and upload it
    Capture {
        /// Show upload progress
        #[arg(long)]
        progress: bool,

        /// Object-key prefix for the hot tier
        #[arg(short, long)]
        prefix: Option<String>,

        /// Optional JSON config file; environment variables override it
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the version number
    Version,
}

/// Main entry point for the capture tool
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run_app(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn run_app(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Capture {
            progress,
            prefix,
            config,
        } => {
            let mut capture_config = CaptureConfig::load(config.as_deref())
                .context("Failed to load capture configuration")?;
            // If the flag is set it overrides the config file and environment
            if let Some(prefix) = prefix {
                capture_config.tiers.hot_prefix = prefix;
                capture_config
                    .tiers
                    .validate()
                    .context("Invalid --prefix value")?;
            }
            tracing::debug!(config = ?capture_config, "Resolved configuration");

            backup::run_capture_flow(&capture_config, progress, cli.debug)
                .await
                .context("Capture process failed")?;
        }
        Commands::Version => {
            println!("{}", version_line());
        }
    }
    Ok(())
}

fn version_line() -> String {
    format!("dbcapture {}", env!("CARGO_PKG_VERSION"))
}
