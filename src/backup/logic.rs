// dbcapture/src/backup/logic.rs
use std::path::Path;
use tempfile::Builder as TempFileBuilder;
use tracing::{info, warn};

use super::db_dump::DumpCaptor;
use super::upload::{destinations_for, UploadPipeline, UploadReport};
use crate::clock::Clock;
use crate::config::CaptureConfig;
use crate::errors::{BackupError, Result};
use crate::storage::ObjectStore;

const TEMP_DIR_PREFIX: &str = "dbcapture";

/// How a run ended when it did not fail.
#[derive(Debug)]
pub enum RunOutcome {
    /// The dump was empty; nothing was uploaded.
    Empty,
    Uploaded(UploadReport),
}

/// Sequences capture, tier planning, upload and cleanup for one run.
pub struct Orchestrator<'a> {
    config: &'a CaptureConfig,
    store: &'a dyn ObjectStore,
    clock: &'a dyn Clock,
    show_progress: bool,
    log_locations: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a CaptureConfig,
        store: &'a dyn ObjectStore,
        clock: &'a dyn Clock,
        show_progress: bool,
        log_locations: bool,
    ) -> Self {
        Orchestrator {
            config,
            store,
            clock,
            show_progress,
            log_locations,
        }
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        info!("======================= Start backup =======================");
        let captor = DumpCaptor::locate(
            &self.config.dump_program,
            self.config.dump_search_path.as_deref(),
        )?;

        let mut builder = TempFileBuilder::new();
        builder.prefix(TEMP_DIR_PREFIX);
        let temp_dir = match &self.config.temp_dump_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| {
                    BackupError::io(
                        format!("Failed to create temp root {}", root.display()),
                        e,
                    )
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| BackupError::io("Failed to create temporary backup directory", e))?;
        let work_dir = temp_dir.path().to_path_buf();
        info!(dir = %work_dir.display(), "Temp dir created");

        // Cleanup is checked whether or not the run failed.
        let outcome = self.capture_and_upload(&captor, &work_dir).await;

        let close_result = temp_dir.close();
        verify_removed(&work_dir, close_result.err());

        info!("======================= End backup =======================");
        outcome
    }

    async fn capture_and_upload(&self, captor: &DumpCaptor, work_dir: &Path) -> Result<RunOutcome> {
        let artifact = captor
            .capture(&self.config.database_url, work_dir, self.clock.now())
            .await?;
        if artifact.is_empty() {
            warn!(file = %artifact.file_name(), "Dump is empty, skipping upload");
            return Ok(RunOutcome::Empty);
        }

        let tiers = self.config.tiers.plan(&self.clock.now());
        let destinations = destinations_for(
            &self.config.spaces.bucket_name,
            &self.config.tiers,
            &tiers,
            artifact.file_name(),
        );
        let report = UploadPipeline::new(self.store, self.show_progress, self.log_locations)
            .upload(&artifact, &destinations)
            .await?;

        info!(
            file = %artifact.file_name(),
            source = %artifact.source,
            captured_at = %artifact.created_at,
            bytes = artifact.size_bytes,
            copies = report.landed().count(),
            "Backup and upload successful"
        );
        Ok(RunOutcome::Uploaded(report))
    }
}

fn verify_removed(work_dir: &Path, close_error: Option<std::io::Error>) {
    if !work_dir.exists() {
        return;
    }
    let warning = BackupError::Cleanup {
        path: work_dir.to_path_buf(),
        reason: close_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "directory still present".to_string()),
    };
    warn!(error = %warning, "Temp dir cleanup did not take effect");
}
