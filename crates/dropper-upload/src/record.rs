//! Per-file upload state.

use std::fmt::{Display, Formatter, Result as FmtResult};

use dropper_core::FileHandle;
use dropper_storage::StorageError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of one record; the correlation key for upload callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        self.0.fmt(f)
    }
}

/// Failure descriptor attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct UploadError {
    message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        Self::new(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Pending,
    Uploading,
    Completed,
    Failed,
}

/// Upload state of one file in a batch.
///
/// Records are immutable; every update produces a replacement record, so a
/// reader holding a snapshot never sees a half-applied change.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    id: RecordId,
    file: FileHandle,
    progress: f64,
    confirmed: bool,
    error: Option<UploadError>,
    location: Option<String>,
}

impl UploadRecord {
    pub(crate) fn new(file: FileHandle) -> Self {
        Self {
            id: RecordId::generate(),
            file,
            progress: 0.0,
            confirmed: false,
            error: None,
            location: None,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn file(&self) -> &FileHandle {
        &self.file
    }

    /// Fraction of the file uploaded, in `[0.0, 1.0]`.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// True once the owning batch has been sent.
    pub fn confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn error(&self) -> Option<&UploadError> {
        self.error.as_ref()
    }

    /// Resolved storage location, set when the upload succeeded.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn state(&self) -> RecordState {
        if self.error.is_some() {
            RecordState::Failed
        } else if self.location.is_some() || self.progress >= 1.0 {
            RecordState::Completed
        } else if self.progress > 0.0 {
            RecordState::Uploading
        } else {
            RecordState::Pending
        }
    }

    /// Completed and failed records take no further progress updates.
    pub(crate) fn accepts_progress(&self) -> bool {
        matches!(self.state(), RecordState::Pending | RecordState::Uploading)
    }

    pub(crate) fn with_progress(&self, progress: f64) -> Self {
        Self {
            progress,
            ..self.clone()
        }
    }

    pub(crate) fn with_error(&self, error: UploadError) -> Self {
        Self {
            error: Some(error),
            ..self.clone()
        }
    }

    pub(crate) fn with_location(&self, location: String) -> Self {
        Self {
            progress: 1.0,
            location: Some(location),
            ..self.clone()
        }
    }

    pub(crate) fn confirm(&self) -> Self {
        Self {
            confirmed: true,
            ..self.clone()
        }
    }
}

/// Progress fraction for a byte count, or `None` when it cannot be computed.
pub(crate) fn progress_fraction(loaded: Option<u64>, total: Option<u64>) -> Option<f64> {
    match (loaded, total) {
        (Some(loaded), Some(total)) if total > 0 => Some((loaded as f64 / total as f64).min(1.0)),
        _ => None,
    }
}
