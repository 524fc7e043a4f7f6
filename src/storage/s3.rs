// dbcapture/src/storage/s3.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use s3::types::{CompletedMultipartUpload, CompletedPart};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{ObjectStore, StoreError, UploadDestination};
use crate::backup::progress::ProgressByteSource;
use crate::config::SpacesConfig;

const PART_SIZE: usize = 5 * 1024 * 1024;
const MAX_PARTS_IN_FLIGHT: usize = 4;
/// S3 rejects part numbers above this.
const MAX_PARTS: u64 = 10_000;

/// Smallest part size at or above `minimum` that fits `size` in `MAX_PARTS` parts.
fn part_size_for(size: u64, minimum: usize) -> usize {
    (minimum as u64).max(size.div_ceil(MAX_PARTS)) as usize
}

/// S3 (or S3-compatible) bucket client.
pub struct S3Store {
    client: s3::Client,
    part_size: usize,
    max_in_flight: usize,
}

impl S3Store {
    pub async fn connect(spaces_config: &SpacesConfig) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(spaces_config.region.clone()));
        if let Some(endpoint) = &spaces_config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (
            &spaces_config.access_key_id,
            &spaces_config.secret_access_key,
        ) {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                key_id, secret, None, // session_token
                None, // expiry
                "Static",
            ));
        }
        let sdk_config = loader.load().await;

        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(spaces_config.force_path_style)
            .build();

        S3Store {
            client: s3::Client::from_conf(s3_config),
            part_size: PART_SIZE,
            max_in_flight: MAX_PARTS_IN_FLIGHT,
        }
    }

    /// Buffers the whole object before sending; progress reaches the full
    /// size before any byte is transferred.
    async fn put_single(
        &self,
        destination: &UploadDestination,
        source: &ProgressByteSource,
        size: u64,
    ) -> Result<Option<String>, StoreError> {
        let mut body = vec![0u8; size as usize];
        source.read_exact_at(&mut body, 0)?;
        self.client
            .put_object()
            .bucket(&destination.bucket)
            .key(&destination.object_key)
            .content_length(size as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(None)
    }

    async fn put_multipart(
        &self,
        destination: &UploadDestination,
        source: &ProgressByteSource,
        size: u64,
    ) -> Result<Option<String>, StoreError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&destination.bucket)
            .key(&destination.object_key)
            .send()
            .await
            .map_err(sdk_error)?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::Rejected("no multipart upload id returned".to_string()))?
            .to_string();

        match self
            .upload_and_complete(destination, &upload_id, source, size)
            .await
        {
            Ok(location) => Ok(location),
            Err(e) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&destination.bucket)
                    .key(&destination.object_key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        key = %destination.object_key,
                        error = %DisplayErrorContext(&abort_err),
                        "Could not abort multipart upload"
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_and_complete(
        &self,
        destination: &UploadDestination,
        upload_id: &str,
        source: &ProgressByteSource,
        size: u64,
    ) -> Result<Option<String>, StoreError> {
        let parts = self
            .upload_parts(destination, upload_id, source, size)
            .await?;
        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(&destination.bucket)
            .key(&destination.object_key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(completed.location().map(str::to_string))
    }

    /// Parts are read in order from the caller's task; only the network
    /// requests run concurrently.
    async fn upload_parts(
        &self,
        destination: &UploadDestination,
        upload_id: &str,
        source: &ProgressByteSource,
        size: u64,
    ) -> Result<Vec<CompletedPart>, StoreError> {
        let mut in_flight: JoinSet<Result<CompletedPart, StoreError>> = JoinSet::new();
        let mut parts = Vec::new();
        let mut offset = 0u64;
        let mut part_number = 1i32;
        let part_size = part_size_for(size, self.part_size);
        debug!(key = %destination.object_key, part_size, "Multipart upload");

        while offset < size {
            let len = (size - offset).min(part_size as u64) as usize;
            let mut chunk = vec![0u8; len];
            source.read_exact_at(&mut chunk, offset)?;

            if in_flight.len() >= self.max_in_flight {
                if let Some(joined) = in_flight.join_next().await {
                    parts.push(joined.map_err(|e| StoreError::Sdk(e.to_string()))??);
                }
            }

            let request = self
                .client
                .upload_part()
                .bucket(&destination.bucket)
                .key(&destination.object_key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk));
            let number = part_number;
            in_flight.spawn(async move {
                let output = request.send().await.map_err(sdk_error)?;
                Ok(CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(number)
                    .build())
            });
            debug!(key = %destination.object_key, part = number, bytes = len, "Queued part");

            offset += len as u64;
            part_number += 1;
        }

        while let Some(joined) = in_flight.join_next().await {
            parts.push(joined.map_err(|e| StoreError::Sdk(e.to_string()))??);
        }
        parts.sort_by_key(|part| part.part_number());
        Ok(parts)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(
        &self,
        destination: &UploadDestination,
        source: &ProgressByteSource,
        size: u64,
    ) -> Result<String, StoreError> {
        let location = if size <= self.part_size as u64 {
            self.put_single(destination, source, size).await?
        } else {
            self.put_multipart(destination, source, size).await?
        };
        Ok(location.unwrap_or_else(|| {
            format!("s3://{}/{}", destination.bucket, destination.object_key)
        }))
    }
}

fn sdk_error<E: std::error::Error>(err: E) -> StoreError {
    StoreError::Sdk(DisplayErrorContext(err).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn small_dumps_use_the_minimum_part_size() {
        assert_eq!(part_size_for(6 * 1024 * 1024, PART_SIZE), PART_SIZE);
        assert_eq!(part_size_for(10 * GIB, PART_SIZE), PART_SIZE);
        assert_eq!(part_size_for(MAX_PARTS * PART_SIZE as u64, PART_SIZE), PART_SIZE);
    }

    #[test]
    fn large_dumps_stay_within_the_part_limit() {
        for size in [
            MAX_PARTS * PART_SIZE as u64 + 1,
            50 * GIB,
            1024 * GIB + 7,
        ] {
            let part = part_size_for(size, PART_SIZE) as u64;
            assert!(part >= PART_SIZE as u64);
            assert!(size.div_ceil(part) <= MAX_PARTS, "size {} needs too many parts", size);
        }
    }
}
