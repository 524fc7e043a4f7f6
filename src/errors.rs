use std::path::PathBuf;
use thiserror::Error;

use crate::backup::tiers::Tier;
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{tool} executable not found in search path: {source}")]
    ToolNotFound {
        tool: String,
        #[source]
        source: which::Error,
    },

    #[error("Dump utility could not reach the database: {stderr}")]
    Connection { stderr: String },

    #[error("Dump utility failed: {stderr}")]
    Dump { stderr: String },

    #[error("Failed to publish {} as {}: {source}", from.display(), to.display())]
    Persist {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload to primary tier failed for key {key}: {source}")]
    PrimaryUpload {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Upload to {tier} tier failed for key {key}: {source}")]
    SecondaryUpload {
        tier: Tier,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Working directory {} was not removed: {reason}", path.display())]
    Cleanup { path: PathBuf, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BackupError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BackupError::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
