//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use dropper_core::{AppError, FileHandle};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(key),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::ConfigError(msg) => AppError::Config(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Progress callback invoked by backends while bytes are being written.
///
/// Arguments are `(loaded_bytes, total_bytes)`; either may be unknown.
pub type ProgressCallback = Arc<dyn Fn(Option<u64>, Option<u64>) + Send + Sync>;

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem, in-memory) implement this trait.
/// The upload tracker receives an `Arc<dyn Storage>` and never knows which
/// backend it is talking to.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload a file to `destination_key` and return its resolved location.
    ///
    /// `on_progress` is called with the running byte count as the payload is
    /// written. Failures are returned as `Err`; no progress is reported after
    /// a failure.
    async fn upload(
        &self,
        destination_key: &str,
        file: &FileHandle,
        on_progress: ProgressCallback,
    ) -> StorageResult<String>;

    /// Turn a resolved location into a time-limited fetchable link.
    async fn signed_url(&self, location: &str, expires_in: Duration) -> StorageResult<String>;

    /// Check if a file exists
    async fn exists(&self, location: &str) -> StorageResult<bool>;

    /// Delete a file by its location
    async fn delete(&self, location: &str) -> StorageResult<()>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

/// Byte ranges of `len` split into `chunk_size` pieces.
pub(crate) fn chunk_ranges(len: usize, chunk_size: usize) -> impl Iterator<Item = (usize, usize)> {
    let chunk_size = chunk_size.max(1);
    (0..len)
        .step_by(chunk_size)
        .map(move |start| (start, (start + chunk_size).min(len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ranges_cover_payload() {
        let ranges: Vec<_> = chunk_ranges(10, 4).collect();
        assert_eq!(ranges, vec![(0, 4), (4, 8), (8, 10)]);
    }

    #[test]
    fn chunk_ranges_empty_payload() {
        assert_eq!(chunk_ranges(0, 4).count(), 0);
    }

    #[test]
    fn storage_error_maps_to_app_error() {
        let err: AppError = StorageError::NotFound("a/b".to_string()).into();
        assert!(matches!(err, AppError::NotFound(_)));

        let err: AppError = StorageError::UploadFailed("reset".to_string()).into();
        assert!(matches!(err, AppError::Storage(_)));
    }
}
