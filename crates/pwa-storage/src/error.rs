//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Staging area not found: {0}")]
    StagingNotFound(String),

    #[error("Invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("Corrupt entry metadata: {0}")]
    CorruptEntry(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}
