//! File handles selected by the user for attachment.

use std::path::Path;

use bytes::Bytes;

use crate::error::AppError;

/// An opaque handle to a file payload: a name plus its bytes.
///
/// Cloning is cheap; clones share the same underlying buffer, so holders keep a
/// reference to the caller's payload rather than a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    name: String,
    data: Bytes,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk into a handle named after the path's final component.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                AppError::InvalidInput(format!("Path has no file name: {}", path.display()))
            })?;
        let data = tokio::fs::read(path).await?;
        Ok(Self::new(name, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Length of the payload in bytes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
