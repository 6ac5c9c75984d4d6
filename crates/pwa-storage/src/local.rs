//! Local disk storage backend

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::backend::{CacheKey, CacheStorage, StagingId, StoredResponse, validate_bucket_name};
use crate::error::StorageError;

const META_EXT: &str = "json";
const BODY_EXT: &str = "body";

/// Local disk storage backend
///
/// Layout:
/// `<base_path>/buckets/<bucket>/<key digest>.{json,body}` for committed
/// entries and `<base_path>/staging/<bucket>.<uuid>/` for staged ones.
/// An entry is visible once its metadata file exists; the body is always
/// written first.
pub struct LocalStorage {
    buckets_path: PathBuf,
    staging_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend
    ///
    /// Staging areas left behind by an interrupted install are removed.
    pub async fn new(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        let buckets_path = base_path.join("buckets");
        let staging_path = base_path.join("staging");

        fs::create_dir_all(&buckets_path).await?;

        match fs::remove_dir_all(&staging_path).await {
            Ok(()) => info!("Removed stale staging areas under {:?}", staging_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Io(e)),
        }
        fs::create_dir_all(&staging_path).await?;

        info!("Initialized local cache storage at {:?}", base_path);

        Ok(Self {
            buckets_path,
            staging_path,
        })
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        validate_bucket_name(bucket)?;
        Ok(self.buckets_path.join(bucket))
    }

    fn staging_dir(&self, staging: &StagingId) -> Result<PathBuf, StorageError> {
        validate_bucket_name(&staging.bucket)?;
        Ok(self.staging_path.join(staging.to_string()))
    }

    async fn write_entry(
        dir: &Path,
        key: &CacheKey,
        response: &StoredResponse,
    ) -> Result<(), StorageError> {
        let digest = key.digest();
        let body_path = dir.join(format!("{}.{}", digest, BODY_EXT));
        let meta_path = dir.join(format!("{}.{}", digest, META_EXT));

        let meta = serde_json::to_vec(&EntryFile { key, response })?;

        // Write atomically using temp files, body before metadata
        let body_tmp = body_path.with_extension("body.tmp");
        fs::write(&body_tmp, &response.body).await?;
        fs::rename(&body_tmp, &body_path).await?;

        let meta_tmp = meta_path.with_extension("json.tmp");
        fs::write(&meta_tmp, &meta).await?;
        fs::rename(&meta_tmp, &meta_path).await?;

        Ok(())
    }
}

/// On-disk metadata record
#[derive(serde::Serialize)]
struct EntryFile<'a> {
    key: &'a CacheKey,
    response: &'a StoredResponse,
}

#[derive(serde::Deserialize)]
struct OwnedEntryFile {
    key: CacheKey,
    response: StoredResponse,
}

fn not_found_to_none<T>(result: std::io::Result<T>) -> Result<Option<T>, StorageError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e)),
    }
}

#[async_trait]
impl CacheStorage for LocalStorage {
    async fn open(&self, bucket: &str) -> Result<(), StorageError> {
        let path = self.bucket_path(bucket)?;
        fs::create_dir_all(&path).await?;
        Ok(())
    }

    async fn has(&self, bucket: &str) -> Result<bool, StorageError> {
        let path = self.bucket_path(bucket)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.buckets_path).await?;

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    async fn delete(&self, bucket: &str) -> Result<bool, StorageError> {
        let path = self.bucket_path(bucket)?;
        debug!("Deleting bucket at {:?}", path);

        match fs::remove_dir_all(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn match_entry(
        &self,
        bucket: &str,
        key: &CacheKey,
    ) -> Result<Option<StoredResponse>, StorageError> {
        let dir = self.bucket_path(bucket)?;
        let digest = key.digest();

        let Some(meta) =
            not_found_to_none(fs::read(dir.join(format!("{}.{}", digest, META_EXT))).await)?
        else {
            return Ok(None);
        };

        let Some(body) =
            not_found_to_none(fs::read(dir.join(format!("{}.{}", digest, BODY_EXT))).await)?
        else {
            warn!("Entry metadata without body in bucket {}: {}", bucket, key);
            return Ok(None);
        };

        let file: OwnedEntryFile = serde_json::from_slice(&meta)?;
        if file.key != *key {
            warn!("Digest collision in bucket {}: {} vs {}", bucket, key, file.key);
            return Ok(None);
        }
        let mut response = file.response;
        response.body = Bytes::from(body);

        debug!("Matched {} in bucket {}", key, bucket);
        Ok(Some(response))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &CacheKey,
        response: &StoredResponse,
    ) -> Result<(), StorageError> {
        let dir = self.bucket_path(bucket)?;
        if !fs::try_exists(&dir).await? {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        debug!("Storing {} in bucket {}", key, bucket);
        Self::write_entry(&dir, key, response).await
    }

    async fn entry_count(&self, bucket: &str) -> Result<usize, StorageError> {
        let dir = self.bucket_path(bucket)?;
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::BucketNotFound(bucket.to_string()));
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut count = 0;
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) == Some(META_EXT) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn begin_staging(&self, bucket: &str) -> Result<StagingId, StorageError> {
        let staging = StagingId::new(bucket);
        let dir = self.staging_dir(&staging)?;
        fs::create_dir_all(&dir).await?;

        debug!("Started staging area {:?}", dir);
        Ok(staging)
    }

    async fn put_staged(
        &self,
        staging: &StagingId,
        key: &CacheKey,
        response: &StoredResponse,
    ) -> Result<(), StorageError> {
        let dir = self.staging_dir(staging)?;
        if !fs::try_exists(&dir).await? {
            return Err(StorageError::StagingNotFound(staging.to_string()));
        }
        Self::write_entry(&dir, key, response).await
    }

    async fn commit_staging(&self, staging: &StagingId) -> Result<(), StorageError> {
        let staged = self.staging_dir(staging)?;
        let target = self.bucket_path(&staging.bucket)?;

        if !fs::try_exists(&staged).await? {
            return Err(StorageError::StagingNotFound(staging.to_string()));
        }

        if !fs::try_exists(&target).await? {
            // Whole bucket appears in one rename
            fs::rename(&staged, &target).await?;
            info!("Committed staging area as new bucket {}", staging.bucket);
            return Ok(());
        }

        // Bucket already exists: move bodies first, then metadata
        fs::create_dir_all(&target).await?;
        let mut bodies = Vec::new();
        let mut metas = Vec::new();
        let mut dir = fs::read_dir(&staged).await?;
        while let Some(entry) = dir.next_entry().await? {
            match entry.path().extension().and_then(|e| e.to_str()) {
                Some(BODY_EXT) => bodies.push(entry.file_name()),
                Some(META_EXT) => metas.push(entry.file_name()),
                _ => {}
            }
        }

        for name in bodies.iter().chain(metas.iter()) {
            fs::rename(staged.join(name), target.join(name)).await?;
        }
        fs::remove_dir_all(&staged).await?;

        info!(
            "Committed {} staged entries into existing bucket {}",
            metas.len(),
            staging.bucket
        );
        Ok(())
    }

    async fn discard_staging(&self, staging: &StagingId) -> Result<(), StorageError> {
        let dir = self.staging_dir(staging)?;
        debug!("Discarding staging area {:?}", dir);

        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
