mod logic;
pub(crate) mod db_dump; // Dump subprocess capture
pub(crate) mod progress; // Progress-counting byte source
pub(crate) mod tiers; // Retention tier planning
pub(crate) mod upload; // Sequential per-tier uploads

use anyhow::{Context, Result};

use crate::clock::SystemClock;
use crate::config::CaptureConfig;
use crate::storage::S3Store;

pub use logic::{Orchestrator, RunOutcome};

/// Public entry point for the capture process.
/// Connects to the configured bucket and runs one capture-and-upload pass.
pub async fn run_capture_flow(
    config: &CaptureConfig,
    show_progress: bool,
    log_locations: bool,
) -> Result<()> {
    let store = S3Store::connect(&config.spaces).await;
    let clock = SystemClock;

    match Orchestrator::new(config, &store, &clock, show_progress, log_locations)
        .run()
        .await
        .context("Backup run failed")?
    {
        RunOutcome::Empty => tracing::warn!("No dump produced, nothing uploaded"),
        RunOutcome::Uploaded(report) => {
            let failed = report.failures().count();
            if failed > 0 {
                tracing::warn!(failed, "Some secondary copies were not placed");
            }
        }
    }
    Ok(())
}
