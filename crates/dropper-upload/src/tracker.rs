//! Upload state for one compose session.

use dropper_core::FileHandle;
use thiserror::Error;
use tokio::sync::watch;

use crate::batch::{FinalizedBatch, UploadBatch};
use crate::record::{RecordId, UploadError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Record index {index} out of range for batch of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Batch has already been sent")]
    BatchConsumed,
}

/// Owns the current batch of one compose session and publishes every change.
///
/// Subscribers receive whole immutable snapshots. Progress, error and location
/// updates address records by id; updates for ids that are no longer in the
/// batch, or that arrive after the batch was sent, are dropped silently.
pub struct UploadBatchTracker {
    batch: watch::Sender<UploadBatch>,
}

impl UploadBatchTracker {
    pub fn new() -> Self {
        Self {
            batch: watch::Sender::new(UploadBatch::empty()),
        }
    }

    /// Start a fresh batch from the selected files, replacing the current one.
    pub fn create_batch(&self, files: impl IntoIterator<Item = FileHandle>) -> UploadBatch {
        let batch = UploadBatch::new(files);
        tracing::debug!(batch_id = %batch.id(), records = batch.len(), "Upload batch created");
        self.batch.send_replace(batch.clone());
        batch
    }

    /// Add files to the current batch.
    pub fn add_files(
        &self,
        files: impl IntoIterator<Item = FileHandle>,
    ) -> Result<UploadBatch, TrackerError> {
        self.try_replace(|batch| batch.with_appended(files))
    }

    pub fn update_progress(&self, id: RecordId, loaded: Option<u64>, total: Option<u64>) {
        let changed = self.apply(|batch| batch.with_progress(id, loaded, total));
        if !changed {
            tracing::trace!(record_id = %id, ?loaded, ?total, "Progress update ignored");
        }
    }

    /// Mark a record failed. Returns whether the batch changed.
    pub fn record_error(&self, id: RecordId, error: UploadError) -> bool {
        let message = error.to_string();
        let applied = self.apply(|batch| batch.with_error(id, error));
        if applied {
            tracing::warn!(record_id = %id, error = %message, "Attachment upload failed");
        } else {
            tracing::debug!(record_id = %id, "Error for unknown or sent record ignored");
        }
        applied
    }

    /// Store a record's resolved location. Returns whether the batch changed.
    pub fn record_location(&self, id: RecordId, location: String) -> bool {
        let applied = self.apply(|batch| batch.with_location(id, location));
        if !applied {
            tracing::debug!(record_id = %id, "Location for unknown or failed record ignored");
        }
        applied
    }

    /// Remove the record at `index`. In-flight uploads for it keep running;
    /// their later updates are ignored.
    pub fn remove_record(&self, index: usize) -> Result<UploadBatch, TrackerError> {
        self.try_replace(|batch| batch.without_index(index))
    }

    /// Confirm and consume the current batch.
    pub fn finalize_for_send(&self) -> Result<FinalizedBatch, TrackerError> {
        let mut outcome = Err(TrackerError::BatchConsumed);
        self.batch.send_if_modified(|batch| match batch.finalize() {
            Ok((consumed, finalized)) => {
                *batch = consumed;
                outcome = Ok(finalized);
                true
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });

        if let Ok(finalized) = &outcome {
            tracing::info!(
                batch_id = %finalized.batch_id,
                attachments = finalized.attachments.len(),
                skipped = finalized.skipped_count(),
                "Upload batch finalized"
            );
        }
        outcome
    }

    /// Current batch.
    pub fn snapshot(&self) -> UploadBatch {
        self.batch.borrow().clone()
    }

    /// Receive a snapshot after every effective change.
    pub fn subscribe(&self) -> watch::Receiver<UploadBatch> {
        self.batch.subscribe()
    }

    /// Replace the batch with `update`'s result, notifying only on change.
    fn apply<F>(&self, update: F) -> bool
    where
        F: FnOnce(&UploadBatch) -> Option<UploadBatch>,
    {
        self.batch.send_if_modified(|batch| match update(batch) {
            Some(next) => {
                *batch = next;
                true
            }
            None => false,
        })
    }

    fn try_replace<F>(&self, update: F) -> Result<UploadBatch, TrackerError>
    where
        F: FnOnce(&UploadBatch) -> Result<UploadBatch, TrackerError>,
    {
        let mut outcome = Err(TrackerError::BatchConsumed);
        self.batch.send_if_modified(|batch| match update(batch) {
            Ok(next) => {
                *batch = next.clone();
                outcome = Ok(next);
                true
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }
}

impl Default for UploadBatchTracker {
    fn default() -> Self {
        Self::new()
    }
}
