use crate::keys::is_safe_key;
use crate::traits::{chunk_ranges, ProgressCallback, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use dropper_core::FileHandle;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::buffered::BufWriter;
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, Result as ObjectResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: Arc<AmazonS3>,
    bucket: String,
    chunk_size: usize,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `chunk_size` - Bytes handed to the writer between progress reports
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        chunk_size: usize,
    ) -> StorageResult<Self> {
        // Credentials come from the standard AWS environment variables.
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store: Arc::new(store),
            bucket,
            chunk_size: chunk_size.max(1),
        })
    }

    fn object_path(key: &str) -> StorageResult<Path> {
        if !is_safe_key(key) {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }
        Ok(Path::from(key))
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(
        &self,
        destination_key: &str,
        file: &FileHandle,
        on_progress: ProgressCallback,
    ) -> StorageResult<String> {
        let location = Self::object_path(destination_key)?;
        let data = file.bytes();
        let total = file.len();
        let start = std::time::Instant::now();

        let store: Arc<dyn object_store::ObjectStore> = self.store.clone();
        let mut writer = BufWriter::new(store, location);

        let upload_failed = |e: std::io::Error| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %destination_key,
                size_bytes = total,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        };

        for (from, to) in chunk_ranges(data.len(), self.chunk_size) {
            if let Err(e) = writer.write_all(&data[from..to]).await {
                // Best effort; the original error is what the caller needs.
                let _ = writer.abort().await;
                return Err(upload_failed(e));
            }
            on_progress(Some(to as u64), Some(total));
        }

        writer.shutdown().await.map_err(upload_failed)?;

        tracing::info!(
            bucket = %self.bucket,
            key = %destination_key,
            size_bytes = total,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(destination_key.to_string())
    }

    async fn signed_url(&self, location: &str, expires_in: Duration) -> StorageResult<String> {
        let path = Self::object_path(location)?;
        let url_result: ObjectResult<_> = self
            .store
            .signed_url(Method::GET, &path, expires_in)
            .await;

        let url = url_result
            .map_err(|e| StorageError::BackendError(e.to_string()))?
            .to_string();

        Ok(url)
    }

    async fn exists(&self, location: &str) -> StorageResult<bool> {
        let path = Self::object_path(location)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn delete(&self, location: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let path = Self::object_path(location)?;

        let result: ObjectResult<_> = self.store.delete(&path).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %location,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 delete failed"
            );
            StorageError::BackendError(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %location,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
