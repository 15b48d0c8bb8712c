use crate::keys::is_safe_key;
use crate::traits::{chunk_ranges, ProgressCallback, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use dropper_core::FileHandle;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Characters escaped inside a single URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
    chunk_size: usize,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/dropper/files")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:3000/files")
    /// * `chunk_size` - Bytes written between progress reports
    pub async fn new(
        base_path: impl Into<PathBuf>,
        base_url: String,
        chunk_size: usize,
    ) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
            chunk_size: chunk_size.max(1),
        })
    }

    /// Convert storage key to filesystem path, rejecting keys that would escape
    /// the base directory.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        if !is_safe_key(storage_key) {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }

        let path = self.base_path.join(storage_key);
        if path.strip_prefix(&self.base_path).is_err() {
            return Err(StorageError::InvalidKey(
                "Storage key resolves outside storage directory".to_string(),
            ));
        }

        Ok(path)
    }

    /// Generate public URL for file
    fn generate_url(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
            .collect();
        format!("{}/{}", self.base_url.trim_end_matches('/'), encoded.join("/"))
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        destination_key: &str,
        file: &FileHandle,
        on_progress: ProgressCallback,
    ) -> StorageResult<String> {
        let path = self.key_to_path(destination_key)?;
        let data = file.bytes();
        let total = file.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut out = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        for (from, to) in chunk_ranges(data.len(), self.chunk_size) {
            out.write_all(&data[from..to]).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to write file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            on_progress(Some(to as u64), Some(total));
        }

        out.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %destination_key,
            size_bytes = total,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(destination_key.to_string())
    }

    async fn signed_url(&self, location: &str, expires_in: Duration) -> StorageResult<String> {
        let path = self.key_to_path(location)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(location.to_string()));
        }

        let expires_at = chrono::Utc::now()
            + chrono::Duration::from_std(expires_in)
                .map_err(|e| StorageError::BackendError(e.to_string()))?;

        Ok(format!(
            "{}?expires={}",
            self.generate_url(location),
            expires_at.timestamp()
        ))
    }

    async fn exists(&self, location: &str) -> StorageResult<bool> {
        let path = self.key_to_path(location)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete(&self, location: &str) -> StorageResult<()> {
        let path = self.key_to_path(location)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await?;

        tracing::info!(
            path = %path.display(),
            key = %location,
            "Local storage delete successful"
        );

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
