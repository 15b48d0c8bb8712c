//! Dropper Core Library
//!
//! This crate provides the domain models, error types and configuration shared by
//! every Dropper component: file handles selected for upload, attachment metadata,
//! the chat message envelope and the storage backend selection.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::Config;
pub use error::AppError;
pub use models::{create_message, format_time, FileHandle, FileMetadata, Message};
pub use storage_types::StorageBackend;
