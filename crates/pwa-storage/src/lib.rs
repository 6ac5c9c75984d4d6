//! Cache bucket storage for the offline shell cache
//!
//! This crate provides the named, versioned cache buckets the controller
//! reads from and writes to, backed by local disk or process memory.

pub mod backend;
pub mod error;
pub mod local;
pub mod memory;

pub use backend::{CacheKey, CacheStorage, StagingId, StoredResponse, validate_bucket_name};
pub use error::StorageError;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
