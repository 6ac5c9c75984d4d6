//! Cache storage trait

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::StorageError;

/// Maximum length of a bucket name
const MAX_BUCKET_NAME_LEN: usize = 128;

/// Identity of a cached request: method plus absolute URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub method: String,
    pub url: String,
}

impl CacheKey {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            url: url.into(),
        }
    }

    /// Key for a GET of `url`
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Stable file-system safe identifier for this key
    pub fn digest(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_bytes());
        hasher.update(b" ");
        hasher.update(self.url.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A response as persisted in a cache bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// Final URL of the response
    pub url: String,
    pub status: u16,
    /// Header pairs in the order they were received
    pub headers: Vec<(String, String)>,
    /// Response type as reported by the network layer ("basic", "cors", ...)
    pub response_type: String,
    pub stored_at: DateTime<Utc>,
    #[serde(skip)]
    pub body: Bytes,
}

impl StoredResponse {
    /// Look up a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Handle to an in-progress staged population of a bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagingId {
    pub bucket: String,
    pub id: Uuid,
}

impl StagingId {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            id: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for StagingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.bucket, self.id)
    }
}

/// Named cache buckets
///
/// Each bucket maps a [`CacheKey`] to a [`StoredResponse`]. Buckets can be
/// populated directly (`put`) or through a staging area that only becomes
/// visible under the bucket name once `commit_staging` succeeds.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a bucket, creating it if it does not exist
    async fn open(&self, bucket: &str) -> Result<(), StorageError>;

    /// Check if a bucket exists
    async fn has(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Names of all committed buckets
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Delete a bucket and all its entries
    async fn delete(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Find the entry for `key` in `bucket`
    async fn match_entry(
        &self,
        bucket: &str,
        key: &CacheKey,
    ) -> Result<Option<StoredResponse>, StorageError>;

    /// Store an entry in an existing bucket
    ///
    /// A missing bucket is `BucketNotFound`; writes never bring a deleted
    /// bucket back.
    async fn put(
        &self,
        bucket: &str,
        key: &CacheKey,
        response: &StoredResponse,
    ) -> Result<(), StorageError>;

    /// Number of entries in a bucket
    async fn entry_count(&self, bucket: &str) -> Result<usize, StorageError>;

    /// Start a staged population of `bucket`
    async fn begin_staging(&self, bucket: &str) -> Result<StagingId, StorageError>;

    /// Store an entry in a staging area
    async fn put_staged(
        &self,
        staging: &StagingId,
        key: &CacheKey,
        response: &StoredResponse,
    ) -> Result<(), StorageError>;

    /// Move every staged entry into the bucket and drop the staging area
    async fn commit_staging(&self, staging: &StagingId) -> Result<(), StorageError>;

    /// Drop a staging area without touching the bucket
    async fn discard_staging(&self, staging: &StagingId) -> Result<(), StorageError>;
}

/// Validate a bucket name before it is used as a path component
pub fn validate_bucket_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name.len() > MAX_BUCKET_NAME_LEN {
        return Err(StorageError::InvalidBucketName(format!(
            "length must be 1-{} characters: {:?}",
            MAX_BUCKET_NAME_LEN, name
        )));
    }

    if name.starts_with('.') {
        return Err(StorageError::InvalidBucketName(format!(
            "must not start with '.': {}",
            name
        )));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(StorageError::InvalidBucketName(format!(
            "invalid character {:?} in {}",
            c, name
        )));
    }

    Ok(())
}
