//! Ordered, copy-on-write collection of upload records.

use std::sync::Arc;

use dropper_core::{FileHandle, FileMetadata};
use uuid::Uuid;

use crate::record::{progress_fraction, RecordId, UploadError, UploadRecord};
use crate::tracker::TrackerError;

/// The files attached to one outgoing message.
///
/// Order is selection order. Updates return a new batch that shares every
/// untouched record with the old one; a batch value itself never changes.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadBatch {
    id: Uuid,
    records: Arc<Vec<Arc<UploadRecord>>>,
    consumed: bool,
}

impl UploadBatch {
    /// One pending record per file, in input order.
    pub fn new(files: impl IntoIterator<Item = FileHandle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            records: Arc::new(files.into_iter().map(new_record).collect()),
            consumed: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn records(&self) -> &[Arc<UploadRecord>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True once `finalize` has run; the batch then takes no further updates.
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    pub fn get(&self, id: RecordId) -> Option<&Arc<UploadRecord>> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn position(&self, id: RecordId) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    /// Append records for more files.
    pub fn with_appended(
        &self,
        files: impl IntoIterator<Item = FileHandle>,
    ) -> Result<Self, TrackerError> {
        if self.consumed {
            return Err(TrackerError::BatchConsumed);
        }
        let mut records: Vec<_> = self.records.iter().cloned().collect();
        records.extend(files.into_iter().map(new_record));
        Ok(self.replace_records(records))
    }

    /// Apply a progress event. `None` when the event changes nothing: unknown
    /// id, consumed batch, finished record or an uncomputable fraction.
    pub fn with_progress(
        &self,
        id: RecordId,
        loaded: Option<u64>,
        total: Option<u64>,
    ) -> Option<Self> {
        let fraction = progress_fraction(loaded, total)?;
        self.update_record(id, |record| {
            record
                .accepts_progress()
                .then(|| record.with_progress(fraction))
        })
    }

    /// Mark a record failed. Applies to any live record.
    pub fn with_error(&self, id: RecordId, error: UploadError) -> Option<Self> {
        self.update_record(id, |record| Some(record.with_error(error)))
    }

    /// Record a successful upload. Failed records stay failed.
    pub fn with_location(&self, id: RecordId, location: String) -> Option<Self> {
        self.update_record(id, |record| {
            record
                .error()
                .is_none()
                .then(|| record.with_location(location))
        })
    }

    /// A batch without the record at `index`, the rest in the same order.
    pub fn without_index(&self, index: usize) -> Result<Self, TrackerError> {
        if self.consumed {
            return Err(TrackerError::BatchConsumed);
        }
        if index >= self.records.len() {
            return Err(TrackerError::IndexOutOfRange {
                index,
                len: self.records.len(),
            });
        }
        let records = self
            .records
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, r)| r.clone())
            .collect();
        Ok(self.replace_records(records))
    }

    /// Confirm every record and turn the batch into attachment metadata.
    ///
    /// Returns the consumed batch together with the attachments of records
    /// that resolved a location and the files left out.
    ///
    /// An error-free record only yields an attachment once its upload has
    /// reported a location. Records still in flight have nothing to link to
    /// and are skipped as [`SkipReason::Unresolved`], so finalizing before the
    /// uploads settle drops those files from the message. Await
    /// `BatchUploader::upload_all` first to attach every successful file.
    pub fn finalize(&self) -> Result<(Self, FinalizedBatch), TrackerError> {
        if self.consumed {
            return Err(TrackerError::BatchConsumed);
        }

        let mut attachments = Vec::new();
        let mut skipped = Vec::new();

        for record in self.records.iter() {
            let filename = record.file().name().to_string();
            match (record.error(), record.location()) {
                (Some(error), _) => skipped.push(SkippedFile {
                    filename,
                    reason: SkipReason::Failed(error.clone()),
                }),
                (None, Some(location)) => attachments.push(FileMetadata {
                    filename,
                    url: location.to_string(),
                    requires_auth: true,
                }),
                (None, None) => skipped.push(SkippedFile {
                    filename,
                    reason: SkipReason::Unresolved,
                }),
            }
        }

        let consumed = Self {
            id: self.id,
            records: Arc::new(
                self.records
                    .iter()
                    .map(|r| Arc::new(r.confirm()))
                    .collect(),
            ),
            consumed: true,
        };

        Ok((
            consumed,
            FinalizedBatch {
                batch_id: self.id,
                attachments,
                skipped,
            },
        ))
    }

    fn update_record<F>(&self, id: RecordId, update: F) -> Option<Self>
    where
        F: FnOnce(&UploadRecord) -> Option<UploadRecord>,
    {
        if self.consumed {
            return None;
        }
        let index = self.position(id)?;
        let replacement = update(&self.records[index])?;

        let mut records: Vec<_> = self.records.iter().cloned().collect();
        records[index] = Arc::new(replacement);
        Some(self.replace_records(records))
    }

    fn replace_records(&self, records: Vec<Arc<UploadRecord>>) -> Self {
        Self {
            id: self.id,
            records: Arc::new(records),
            consumed: self.consumed,
        }
    }
}

impl Default for UploadBatch {
    fn default() -> Self {
        Self::empty()
    }
}

fn new_record(file: FileHandle) -> Arc<UploadRecord> {
    Arc::new(UploadRecord::new(file))
}

/// Why a file was left out of a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Failed(UploadError),
    /// The upload never reported a location before the batch was sent.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub filename: String,
    pub reason: SkipReason,
}

/// Output of finalizing a batch for send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedBatch {
    pub batch_id: Uuid,
    pub attachments: Vec<FileMetadata>,
    pub skipped: Vec<SkippedFile>,
}

impl FinalizedBatch {
    /// `(filename, resolved location)` for each attachment, in batch order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attachments
            .iter()
            .map(|a| (a.filename.as_str(), a.url.as_str()))
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordState;

    fn files(names: &[&str]) -> Vec<FileHandle> {
        names
            .iter()
            .map(|n| FileHandle::new(*n, n.as_bytes().to_vec()))
            .collect()
    }

    fn ids(batch: &UploadBatch) -> Vec<RecordId> {
        batch.records().iter().map(|r| r.id()).collect()
    }

    #[test]
    fn new_batch_has_pending_records_in_order() {
        let batch = UploadBatch::new(files(&["f1", "f2", "f3"]));

        assert_eq!(batch.len(), 3);
        let names: Vec<_> = batch.records().iter().map(|r| r.file().name()).collect();
        assert_eq!(names, vec!["f1", "f2", "f3"]);
        assert!(batch.records().iter().all(|r| r.progress() == 0.0));

        let ids = ids(&batch);
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_ne!(ids[0], ids[2]);
    }

    #[test]
    fn progress_touches_only_the_addressed_record() {
        let batch = UploadBatch::new(files(&["f1", "f2", "f3"]));
        let ids = ids(&batch);

        let updated = batch.with_progress(ids[1], Some(50), Some(100)).unwrap();

        assert_eq!(updated.records()[1].progress(), 0.5);
        assert_eq!(updated.records()[0].progress(), 0.0);
        assert_eq!(updated.records()[2].progress(), 0.0);
        // Untouched records are shared, the old snapshot is unchanged.
        assert!(Arc::ptr_eq(&batch.records()[0], &updated.records()[0]));
        assert_eq!(batch.records()[1].progress(), 0.0);
    }

    #[test]
    fn progress_after_error_is_ignored() {
        let batch = UploadBatch::new(files(&["f1", "f2", "f3"]));
        let ids = ids(&batch);
        let error = UploadError::new("E");

        let batch = batch.with_progress(ids[1], Some(50), Some(100)).unwrap();
        let batch = batch.with_error(ids[1], error.clone()).unwrap();
        assert!(batch.with_progress(ids[1], Some(75), Some(100)).is_none());

        let record = batch.get(ids[1]).unwrap();
        assert_eq!(record.progress(), 0.5);
        assert_eq!(record.error(), Some(&error));
    }

    #[test]
    fn zero_or_unknown_total_leaves_progress_unchanged() {
        let batch = UploadBatch::new(files(&["f1"]));
        let id = ids(&batch)[0];

        assert!(batch.with_progress(id, Some(10), Some(0)).is_none());
        assert!(batch.with_progress(id, None, Some(10)).is_none());
        assert!(batch.with_progress(id, Some(10), None).is_none());
    }

    #[test]
    fn completed_record_ignores_stale_progress() {
        let batch = UploadBatch::new(files(&["f1"]));
        let id = ids(&batch)[0];

        let batch = batch.with_progress(id, Some(100), Some(100)).unwrap();
        assert_eq!(batch.records()[0].state(), RecordState::Completed);
        assert!(batch.with_progress(id, Some(40), Some(100)).is_none());

        let batch = batch.with_location(id, "k/f1".to_string()).unwrap();
        assert!(batch.with_progress(id, Some(40), Some(100)).is_none());
        assert_eq!(batch.records()[0].progress(), 1.0);
    }

    #[test]
    fn location_does_not_revive_failed_record() {
        let batch = UploadBatch::new(files(&["f1"]));
        let id = ids(&batch)[0];

        let batch = batch.with_error(id, UploadError::new("network lost")).unwrap();
        assert!(batch.with_location(id, "k/f1".to_string()).is_none());
    }

    #[test]
    fn remove_keeps_relative_order_and_drops_stale_updates() {
        let batch = UploadBatch::new(files(&["f1", "f2", "f3"]));
        let ids = ids(&batch);

        let trimmed = batch.without_index(1).unwrap();
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed.records()[0].id(), ids[0]);
        assert_eq!(trimmed.records()[1].id(), ids[2]);

        assert!(trimmed.with_progress(ids[1], Some(1), Some(2)).is_none());
        assert!(trimmed.with_error(ids[1], UploadError::new("late")).is_none());
    }

    #[test]
    fn remove_out_of_range_fails() {
        let batch = UploadBatch::new(files(&["f1"]));
        assert_eq!(
            batch.without_index(1).unwrap_err(),
            TrackerError::IndexOutOfRange { index: 1, len: 1 }
        );
    }

    #[test]
    fn finalize_skips_failed_records_in_order() {
        let batch = UploadBatch::new(files(&["f1", "f2", "f3"]));
        let ids = ids(&batch);

        let batch = batch.with_location(ids[0], "p/1/f1".to_string()).unwrap();
        let batch = batch.with_error(ids[1], UploadError::new("E")).unwrap();
        let batch = batch.with_location(ids[2], "p/3/f3".to_string()).unwrap();

        let (consumed, finalized) = batch.finalize().unwrap();

        let pairs: Vec<_> = finalized.pairs().collect();
        assert_eq!(pairs, vec![("f1", "p/1/f1"), ("f3", "p/3/f3")]);
        assert!(finalized.attachments.iter().all(|a| a.requires_auth));
        assert_eq!(finalized.skipped_count(), 1);
        assert_eq!(finalized.skipped[0].filename, "f2");

        assert!(consumed.is_consumed());
        assert!(consumed.records().iter().all(|r| r.confirmed()));
        assert!(!batch.records()[0].confirmed());
    }

    #[test]
    fn finalize_reports_unresolved_uploads() {
        let batch = UploadBatch::new(files(&["f1"]));
        let (_, finalized) = batch.finalize().unwrap();

        assert!(finalized.attachments.is_empty());
        assert_eq!(finalized.skipped[0].reason, SkipReason::Unresolved);
    }

    #[test]
    fn consumed_batch_rejects_mutation() {
        let batch = UploadBatch::new(files(&["f1", "f2"]));
        let id = ids(&batch)[0];
        let (consumed, _) = batch.finalize().unwrap();

        assert!(consumed.with_progress(id, Some(1), Some(2)).is_none());
        assert!(consumed.with_error(id, UploadError::new("late")).is_none());
        assert_eq!(consumed.without_index(0).unwrap_err(), TrackerError::BatchConsumed);
        assert_eq!(
            consumed.with_appended(files(&["f3"])).unwrap_err(),
            TrackerError::BatchConsumed
        );
        assert_eq!(consumed.finalize().unwrap_err(), TrackerError::BatchConsumed);
    }

    #[test]
    fn append_keeps_existing_records() {
        let batch = UploadBatch::new(files(&["f1"]));
        let first = ids(&batch)[0];

        let grown = batch.with_appended(files(&["f2"])).unwrap();
        assert_eq!(grown.len(), 2);
        assert_eq!(grown.records()[0].id(), first);
        assert_eq!(grown.id(), batch.id());
    }
}
