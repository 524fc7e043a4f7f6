// dbcapture/src/backup/upload.rs
use std::io::{Seek, SeekFrom};
use std::sync::Arc;
use tracing::{info, warn};

use super::db_dump::BackupArtifact;
use super::progress::{BarSink, ProgressByteSource, ProgressSink};
use super::tiers::{Tier, TierPolicy};
use crate::errors::{BackupError, Result};
use crate::storage::{ObjectStore, UploadDestination};

/// Result of one destination upload: remote location or a secondary-tier error.
#[derive(Debug)]
pub struct TierOutcome {
    pub destination: UploadDestination,
    pub result: std::result::Result<String, BackupError>,
}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub outcomes: Vec<TierOutcome>,
}

impl UploadReport {
    pub fn landed(&self) -> impl Iterator<Item = (&UploadDestination, &str)> {
        self.outcomes.iter().filter_map(|outcome| {
            outcome
                .result
                .as_ref()
                .ok()
                .map(|location| (&outcome.destination, location.as_str()))
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &BackupError> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err())
    }
}

/// Builds one destination per planned tier, in plan order.
pub fn destinations_for(
    bucket: &str,
    policy: &TierPolicy,
    tiers: &[Tier],
    file_name: &str,
) -> Vec<UploadDestination> {
    tiers
        .iter()
        .map(|tier| UploadDestination::new(bucket, *tier, policy.prefix(*tier), file_name))
        .collect()
}

/// Sends one artifact to several destinations, one after another.
pub struct UploadPipeline<'a> {
    store: &'a dyn ObjectStore,
    show_progress: bool,
    log_locations: bool,
}

impl<'a> UploadPipeline<'a> {
    pub fn new(store: &'a dyn ObjectStore, show_progress: bool, log_locations: bool) -> Self {
        UploadPipeline {
            store,
            show_progress,
            log_locations,
        }
    }

    /// A failed primary upload aborts before any secondary tier is tried.
    /// Secondary failures are logged and recorded in the report.
    pub async fn upload(
        &self,
        artifact: &BackupArtifact,
        destinations: &[UploadDestination],
    ) -> Result<UploadReport> {
        let file = std::fs::File::open(&artifact.path).map_err(|e| {
            BackupError::io(format!("Failed to open file {}", artifact.path.display()), e)
        })?;
        let mut source = ProgressByteSource::new(file);
        let mut report = UploadReport::default();

        for destination in destinations {
            source.seek(SeekFrom::Start(0)).map_err(|e| {
                BackupError::io(format!("Failed to rewind {}", artifact.path.display()), e)
            })?;
            let sink = Arc::new(BarSink::new(
                artifact.size_bytes,
                self.show_progress,
                &destination.object_key,
            ));
            source.attach(sink.clone());

            info!(
                tier = %destination.tier,
                key = %destination.object_key,
                bucket = %destination.bucket,
                "Uploading {}",
                artifact.file_name()
            );
            let result = self
                .store
                .put_object(destination, &source, artifact.size_bytes)
                .await;

            match result {
                Ok(location) => {
                    sink.finish();
                    if self.log_locations {
                        info!(tier = %destination.tier, bytes = source.transferred(), "Successfully uploaded to {}", location);
                    } else {
                        info!(tier = %destination.tier, bytes = source.transferred(), "Successfully uploaded to {}", destination.key_prefix);
                    }
                    report.outcomes.push(TierOutcome {
                        destination: destination.clone(),
                        result: Ok(location),
                    });
                }
                Err(source_err) if destination.tier.is_primary() => {
                    sink.abandon();
                    return Err(BackupError::PrimaryUpload {
                        key: destination.object_key.clone(),
                        source: source_err,
                    });
                }
                Err(source_err) => {
                    sink.abandon();
                    let err = BackupError::SecondaryUpload {
                        tier: destination.tier,
                        key: destination.object_key.clone(),
                        source: source_err,
                    };
                    warn!(tier = %destination.tier, error = %err, "Secondary copy not placed, continuing");
                    report.outcomes.push(TierOutcome {
                        destination: destination.clone(),
                        result: Err(err),
                    });
                }
            }
        }

        Ok(report)
    }
}
