// dbcapture/src/storage/mod.rs
pub(crate) mod s3;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::backup::progress::ProgressByteSource;
use crate::backup::tiers::Tier;

pub use s3::S3Store;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("S3 request failed: {0}")]
    Sdk(String),

    #[error("Failed to read artifact for upload: {0}")]
    Read(#[from] std::io::Error),

    #[error("Object store rejected the upload: {0}")]
    Rejected(String),
}

/// Where one copy of an artifact goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDestination {
    pub bucket: String,
    pub tier: Tier,
    pub key_prefix: String,
    pub object_key: String,
}

impl UploadDestination {
    pub fn new(bucket: &str, tier: Tier, key_prefix: &str, file_name: &str) -> Self {
        let key_prefix = key_prefix.trim_matches('/').to_string();
        let object_key = format!("{}/{}", key_prefix, file_name);
        UploadDestination {
            bucket: bucket.to_string(),
            tier,
            key_prefix,
            object_key,
        }
    }
}

/// Remote object storage. Part size, concurrency and per-part retries are
/// the implementation's business; callers only position the source.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `size` bytes of `source` and returns the remote location.
    async fn put_object(
        &self,
        destination: &UploadDestination,
        source: &ProgressByteSource,
        size: u64,
    ) -> Result<String, StoreError>;
}
