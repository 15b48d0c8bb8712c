//! In-process storage backend.
//!
//! Keeps uploaded payloads in a map. Used for dry runs and as the injected
//! collaborator in tests, where failures can be scripted per filename.

use crate::keys::is_safe_key;
use crate::traits::{chunk_ranges, ProgressCallback, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use dropper_core::FileHandle;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct Inner {
    files: HashMap<String, Bytes>,
    failing: HashSet<String>,
}

/// Storage implementation that keeps files in memory
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
    chunk_size: usize,
}

impl MemoryStorage {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Make every upload of a file with this name fail before reporting progress.
    pub fn fail_uploads_of(&self, filename: &str) {
        self.lock().failing.insert(filename.to_string());
    }

    /// Get file data (for assertions)
    pub fn get_file(&self, key: &str) -> Option<Bytes> {
        self.lock().files.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().files.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upload(
        &self,
        destination_key: &str,
        file: &FileHandle,
        on_progress: ProgressCallback,
    ) -> StorageResult<String> {
        if !is_safe_key(destination_key) {
            return Err(StorageError::InvalidKey(destination_key.to_string()));
        }

        let fails = self.lock().failing.contains(file.name());
        let total = file.len();

        if fails {
            tokio::task::yield_now().await;
            tracing::warn!(key = %destination_key, "Memory storage upload failed");
            return Err(StorageError::UploadFailed(format!(
                "simulated failure for {}",
                file.name()
            )));
        }

        for (_, to) in chunk_ranges(file.bytes().len(), self.chunk_size) {
            // Let sibling uploads run between chunks.
            tokio::task::yield_now().await;
            on_progress(Some(to as u64), Some(total));
        }

        self.lock()
            .files
            .insert(destination_key.to_string(), file.bytes().clone());

        tracing::debug!(
            key = %destination_key,
            size_bytes = total,
            "Memory storage upload successful"
        );

        Ok(destination_key.to_string())
    }

    async fn signed_url(&self, location: &str, expires_in: Duration) -> StorageResult<String> {
        if !self.lock().files.contains_key(location) {
            return Err(StorageError::NotFound(location.to_string()));
        }
        Ok(format!(
            "memory://{}?expires_in={}",
            location,
            expires_in.as_secs()
        ))
    }

    async fn exists(&self, location: &str) -> StorageResult<bool> {
        Ok(self.lock().files.contains_key(location))
    }

    async fn delete(&self, location: &str) -> StorageResult<()> {
        self.lock().files.remove(location);
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
