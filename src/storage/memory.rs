use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use super::{ObjectStore, StoreError, UploadDestination};
use crate::backup::progress::ProgressByteSource;
use crate::backup::tiers::Tier;

/// Bucket kept in memory, reading in small parts like a real multipart client.
#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Transferred-byte counter observed when each put finished, in call order.
    pub counters: Mutex<Vec<(Tier, u64)>>,
    pub attempts: Mutex<Vec<Tier>>,
    failing: HashSet<Tier>,
}

impl MemoryStore {
    const PART: u64 = 64;

    pub fn failing_on(tiers: &[Tier]) -> Self {
        MemoryStore {
            failing: tiers.iter().copied().collect(),
            ..MemoryStore::default()
        }
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(
        &self,
        destination: &UploadDestination,
        source: &ProgressByteSource,
        size: u64,
    ) -> Result<String, StoreError> {
        self.attempts.lock().unwrap().push(destination.tier);
        if self.failing.contains(&destination.tier) {
            return Err(StoreError::Rejected(format!(
                "injected failure for {}",
                destination.object_key
            )));
        }

        let mut body = vec![0u8; size as usize];
        let mut offset = 0u64;
        // Fetch parts out of order to mimic concurrent part uploads.
        let mut starts: Vec<u64> = (0..size).step_by(Self::PART as usize).collect();
        starts.reverse();
        for start in starts {
            let end = (start + Self::PART).min(size);
            source.read_exact_at(&mut body[start as usize..end as usize], start)?;
            offset += end - start;
        }
        debug_assert_eq!(offset, size);

        self.counters
            .lock()
            .unwrap()
            .push((destination.tier, source.transferred()));
        self.objects
            .lock()
            .unwrap()
            .insert(destination.object_key.clone(), body);
        Ok(format!(
            "memory://{}/{}",
            destination.bucket, destination.object_key
        ))
    }
}
