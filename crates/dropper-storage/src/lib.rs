//! Dropper Storage Library
//!
//! This crate provides the upload and link-signing collaborators used by the
//! attachment tracker: the `Storage` trait and implementations for S3, the local
//! filesystem and an in-process map.
//!
//! # Storage key format
//!
//! Attachment keys are record-scoped: `{prefix}/{record_id}/{filename}`. The
//! resolved location returned by every backend is the storage key itself, so it
//! stays stable and can be handed back to `Storage::signed_url` later.
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized in the
//! `keys` module so all backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-memory")]
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use dropper_core::StorageBackend;
pub use factory::create_storage;
pub use keys::destination_key;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-memory")]
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ProgressCallback, Storage, StorageError, StorageResult};
