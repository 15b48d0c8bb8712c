//! Configuration module
//!
//! Storage selection, upload tuning and link signing settings, read from the
//! environment (optionally seeded from a `.env` file).

use std::env;
use std::time::Duration;

use crate::storage_types::StorageBackend;

const UPLOAD_KEY_PREFIX: &str = "attachments";
const PROGRESS_WINDOW_MS: u64 = 100;
const UPLOAD_CHUNK_SIZE_BYTES: usize = 64 * 1024;
const SIGNED_URL_EXPIRY_SECS: u64 = 3600;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Upload behavior
    pub upload_key_prefix: String,
    pub progress_window_ms: u64,
    pub upload_chunk_size_bytes: usize,
    pub signed_url_expiry_secs: u64,
}

/// Parse an optional non-negative integer variable; a malformed value is an error.
fn parse_number<T, F>(lookup: &F, key: &str) -> Result<Option<T>, anyhow::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{} must be a non-negative integer: {}", key, e))
        })
        .transpose()
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let storage_backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::Local,
        };

        let progress_window_ms =
            parse_number(&lookup, "PROGRESS_WINDOW_MS")?.unwrap_or(PROGRESS_WINDOW_MS);
        let upload_chunk_size_bytes =
            parse_number(&lookup, "UPLOAD_CHUNK_SIZE_BYTES")?.unwrap_or(UPLOAD_CHUNK_SIZE_BYTES);
        let signed_url_expiry_secs =
            parse_number(&lookup, "SIGNED_URL_EXPIRY_SECS")?.unwrap_or(SIGNED_URL_EXPIRY_SECS);

        let upload_key_prefix = lookup("UPLOAD_KEY_PREFIX")
            .map(|v| v.trim().trim_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| UPLOAD_KEY_PREFIX.to_string());

        Ok(Config {
            environment,
            storage_backend,
            s3_bucket: lookup("S3_BUCKET"),
            s3_region: lookup("S3_REGION"),
            s3_endpoint: lookup("S3_ENDPOINT"),
            aws_region: lookup("AWS_REGION"),
            local_storage_path: lookup("LOCAL_STORAGE_PATH"),
            local_storage_base_url: lookup("LOCAL_STORAGE_BASE_URL"),
            upload_key_prefix,
            progress_window_ms,
            upload_chunk_size_bytes,
            signed_url_expiry_secs,
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.upload_chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!(
                "UPLOAD_CHUNK_SIZE_BYTES must be greater than zero"
            ));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {
                if self.is_production() {
                    return Err(anyhow::anyhow!(
                        "Memory storage backend cannot be used in production"
                    ));
                }
            }
        }

        Ok(())
    }

    // Convenience getters
    pub fn storage_backend(&self) -> StorageBackend {
        self.storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.aws_region.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.local_storage_base_url.as_deref()
    }

    pub fn upload_key_prefix(&self) -> &str {
        &self.upload_key_prefix
    }

    pub fn progress_window(&self) -> Duration {
        Duration::from_millis(self.progress_window_ms)
    }

    pub fn upload_chunk_size_bytes(&self) -> usize {
        self.upload_chunk_size_bytes
    }

    pub fn signed_url_expiry(&self) -> Duration {
        Duration::from_secs(self.signed_url_expiry_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, anyhow::Error> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.storage_backend(), StorageBackend::Local);
        assert_eq!(config.upload_key_prefix(), "attachments");
        assert_eq!(config.progress_window(), Duration::from_millis(100));
        assert_eq!(config.upload_chunk_size_bytes(), 64 * 1024);
        assert_eq!(config.signed_url_expiry(), Duration::from_secs(3600));
        assert!(!config.is_production());
    }

    #[test]
    fn negative_progress_window_is_rejected() {
        let err = config_from(&[("PROGRESS_WINDOW_MS", "-5")]).unwrap_err();
        assert!(err.to_string().contains("PROGRESS_WINDOW_MS"));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = config_from(&[("UPLOAD_CHUNK_SIZE_BYTES", "64k")]).unwrap_err();
        assert!(err.to_string().contains("UPLOAD_CHUNK_SIZE_BYTES"));

        let err = config_from(&[("SIGNED_URL_EXPIRY_SECS", "-1")]).unwrap_err();
        assert!(err.to_string().contains("SIGNED_URL_EXPIRY_SECS"));

        let config = config_from(&[
            ("UPLOAD_CHUNK_SIZE_BYTES", " 4096 "),
            ("SIGNED_URL_EXPIRY_SECS", "60"),
        ])
        .unwrap();
        assert_eq!(config.upload_chunk_size_bytes(), 4096);
        assert_eq!(config.signed_url_expiry(), Duration::from_secs(60));
    }

    #[test]
    fn key_prefix_is_trimmed_of_slashes() {
        let config = config_from(&[("UPLOAD_KEY_PREFIX", "/chat/files/")]).unwrap();
        assert_eq!(config.upload_key_prefix(), "chat/files");
    }

    #[test]
    fn s3_requires_bucket_and_region() {
        let config = config_from(&[("STORAGE_BACKEND", "s3")]).unwrap();
        assert!(config.validate().is_err());

        let config = config_from(&[
            ("STORAGE_BACKEND", "s3"),
            ("S3_BUCKET", "dropper-files"),
            ("AWS_REGION", "us-west-1"),
        ])
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn local_requires_path_and_base_url() {
        let config = config_from(&[("LOCAL_STORAGE_PATH", "/tmp/dropper")]).unwrap();
        assert!(config.validate().is_err());

        let config = config_from(&[
            ("LOCAL_STORAGE_PATH", "/tmp/dropper"),
            ("LOCAL_STORAGE_BASE_URL", "http://localhost:3000/files"),
        ])
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn memory_backend_rejected_in_production() {
        let config =
            config_from(&[("STORAGE_BACKEND", "memory"), ("ENVIRONMENT", "production")]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_backend_fails_to_parse() {
        assert!(config_from(&[("STORAGE_BACKEND", "ftp")]).is_err());
    }
}
