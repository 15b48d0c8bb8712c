//! Drives the uploads of a batch against a storage backend.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dropper_core::{create_message, Config, FileMetadata, Message};
use dropper_storage::{destination_key, ProgressCallback, Storage, StorageResult};
use futures::future::join_all;

use crate::batch::SkippedFile;
use crate::rate_limiter::RateLimiter;
use crate::record::{progress_fraction, RecordId, RecordState, UploadError, UploadRecord};
use crate::scheduler::Scheduler;
use crate::tracker::{TrackerError, UploadBatchTracker};

#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Minimum spacing between visible progress updates of one file.
    pub progress_window: Duration,
    pub key_prefix: String,
    /// Lifetime of signed attachment links.
    pub link_expiry: Duration,
}

impl UploadSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            progress_window: config.progress_window(),
            key_prefix: config.upload_key_prefix().to_string(),
            link_expiry: config.signed_url_expiry(),
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            progress_window: Duration::from_millis(100),
            key_prefix: "attachments".to_string(),
            link_expiry: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Uploads that settled after their record had left the batch.
    pub discarded: usize,
}

enum Outcome {
    Succeeded,
    Failed,
    Discarded,
}

/// A message ready to send plus the files that could not be attached.
#[derive(Debug, Clone)]
pub struct ComposedMessage {
    pub message: Message,
    pub skipped: Vec<SkippedFile>,
}

pub struct BatchUploader {
    storage: Arc<dyn Storage>,
    scheduler: Arc<dyn Scheduler>,
    settings: UploadSettings,
    /// Records with an upload currently running.
    in_flight: Mutex<HashSet<RecordId>>,
}

/// Releases a record's in-flight claim when its upload settles or is dropped.
struct InFlightClaim<'a> {
    uploader: &'a BatchUploader,
    id: RecordId,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.uploader.lock_in_flight().remove(&self.id);
    }
}

impl BatchUploader {
    pub fn new(
        storage: Arc<dyn Storage>,
        scheduler: Arc<dyn Scheduler>,
        settings: UploadSettings,
    ) -> Self {
        Self {
            storage,
            scheduler,
            settings,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Upload every pending record of the tracker's current batch concurrently.
    ///
    /// Records whose upload is already running, from an earlier call, are left
    /// alone, so files added to the batch can be uploaded while the first ones
    /// are still in flight. Each record gets its own rate limiter for progress.
    /// Results are routed back by record id; a failure is recorded on its
    /// record and never stops the other uploads.
    pub async fn upload_all(&self, tracker: &Arc<UploadBatchTracker>) -> UploadSummary {
        // A claim is released only after its result reached the tracker, so a
        // snapshot taken under the lock shows every unclaimed record settled.
        let (batch, claimed) = {
            let mut in_flight = self.lock_in_flight();
            let batch = tracker.snapshot();
            if batch.is_consumed() {
                return UploadSummary::default();
            }
            let claimed: Vec<Arc<UploadRecord>> = batch
                .records()
                .iter()
                .filter(|record| {
                    matches!(
                        record.state(),
                        RecordState::Pending | RecordState::Uploading
                    )
                })
                .filter(|record| in_flight.insert(record.id()))
                .cloned()
                .collect();
            (batch, claimed)
        };

        let uploads = claimed.into_iter().map(|record| {
            let claim = InFlightClaim {
                uploader: self,
                id: record.id(),
            };
            self.upload_record(tracker.clone(), record, claim)
        });

        let mut summary = UploadSummary::default();
        for outcome in join_all(uploads).await {
            match outcome {
                Outcome::Succeeded => summary.succeeded += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::Discarded => summary.discarded += 1,
            }
        }

        tracing::info!(
            batch_id = %batch.id(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            discarded = summary.discarded,
            "Upload batch settled"
        );
        summary
    }

    async fn upload_record(
        &self,
        tracker: Arc<UploadBatchTracker>,
        record: Arc<UploadRecord>,
        _claim: InFlightClaim<'_>,
    ) -> Outcome {
        let id = record.id();
        let file = record.file();
        let key = destination_key(&self.settings.key_prefix, id, file.name());

        let limiter = RateLimiter::from_duration(self.settings.progress_window, self.scheduler.clone());
        let progress_tracker = tracker.clone();
        let on_progress: ProgressCallback = Arc::new(move |loaded, total| {
            // Events without a usable fraction must not close the window.
            if progress_fraction(loaded, total).is_none() {
                return;
            }
            limiter.attempt(|| progress_tracker.update_progress(id, loaded, total));
        });

        let start = std::time::Instant::now();
        match self.storage.upload(&key, file, on_progress).await {
            Ok(location) => {
                tracing::debug!(
                    record_id = %id,
                    key = %key,
                    size_bytes = file.len(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Attachment uploaded"
                );
                if tracker.record_location(id, location) {
                    Outcome::Succeeded
                } else {
                    Outcome::Discarded
                }
            }
            Err(e) => {
                if tracker.record_error(id, UploadError::from(e)) {
                    Outcome::Failed
                } else {
                    Outcome::Discarded
                }
            }
        }
    }

    /// Finalize the tracker's batch and wrap its attachments in a message.
    pub fn compose_message(
        &self,
        tracker: &UploadBatchTracker,
        text: Option<String>,
    ) -> Result<ComposedMessage, TrackerError> {
        let finalized = tracker.finalize_for_send()?;
        if finalized.skipped_count() > 0 {
            tracing::warn!(
                skipped = finalized.skipped_count(),
                "Some attachments were left out of the message"
            );
        }

        Ok(ComposedMessage {
            message: create_message(text, None, Some(finalized.attachments)),
            skipped: finalized.skipped,
        })
    }

    /// Resolve fetchable links for a message's attachments, in order.
    ///
    /// Attachments that require auth are signed; others are returned as is.
    pub async fn sign_attachments(&self, files: &[FileMetadata]) -> Vec<StorageResult<String>> {
        let mut links = Vec::with_capacity(files.len());
        for file in files {
            let link = if file.requires_auth {
                self.storage
                    .signed_url(&file.url, self.settings.link_expiry)
                    .await
            } else {
                Ok(file.url.clone())
            };
            links.push(link);
        }
        links
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashSet<RecordId>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
