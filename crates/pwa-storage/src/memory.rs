//! In-memory storage backend

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::backend::{CacheKey, CacheStorage, StagingId, StoredResponse, validate_bucket_name};
use crate::error::StorageError;

type Bucket = HashMap<CacheKey, StoredResponse>;

/// In-memory storage backend
///
/// Nothing survives a restart; useful for ephemeral deployments and tests.
#[derive(Default)]
pub struct MemoryStorage {
    buckets: RwLock<BTreeMap<String, Bucket>>,
    staging: RwLock<HashMap<StagingId, Bucket>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, bucket: &str) -> Result<(), StorageError> {
        validate_bucket_name(bucket)?;
        self.buckets.write().entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn has(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.buckets.read().contains_key(bucket))
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.buckets.read().keys().cloned().collect())
    }

    async fn delete(&self, bucket: &str) -> Result<bool, StorageError> {
        debug!("Deleting in-memory bucket {}", bucket);
        Ok(self.buckets.write().remove(bucket).is_some())
    }

    async fn match_entry(
        &self,
        bucket: &str,
        key: &CacheKey,
    ) -> Result<Option<StoredResponse>, StorageError> {
        Ok(self
            .buckets
            .read()
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &CacheKey,
        response: &StoredResponse,
    ) -> Result<(), StorageError> {
        validate_bucket_name(bucket)?;
        self.buckets
            .write()
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?
            .insert(key.clone(), response.clone());
        Ok(())
    }

    async fn entry_count(&self, bucket: &str) -> Result<usize, StorageError> {
        self.buckets
            .read()
            .get(bucket)
            .map(HashMap::len)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))
    }

    async fn begin_staging(&self, bucket: &str) -> Result<StagingId, StorageError> {
        validate_bucket_name(bucket)?;
        let staging = StagingId::new(bucket);
        self.staging.write().insert(staging.clone(), Bucket::new());
        Ok(staging)
    }

    async fn put_staged(
        &self,
        staging: &StagingId,
        key: &CacheKey,
        response: &StoredResponse,
    ) -> Result<(), StorageError> {
        let mut areas = self.staging.write();
        let area = areas
            .get_mut(staging)
            .ok_or_else(|| StorageError::StagingNotFound(staging.to_string()))?;
        area.insert(key.clone(), response.clone());
        Ok(())
    }

    async fn commit_staging(&self, staging: &StagingId) -> Result<(), StorageError> {
        let area = self
            .staging
            .write()
            .remove(staging)
            .ok_or_else(|| StorageError::StagingNotFound(staging.to_string()))?;

        self.buckets
            .write()
            .entry(staging.bucket.clone())
            .or_default()
            .extend(area);
        Ok(())
    }

    async fn discard_staging(&self, staging: &StagingId) -> Result<(), StorageError> {
        self.staging.write().remove(staging);
        Ok(())
    }
}
