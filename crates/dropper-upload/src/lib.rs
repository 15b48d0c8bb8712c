//! Dropper Upload Library
//!
//! Tracks a batch of user-selected files while they upload, with progress
//! notifications rate limited per file.
//!
//! - [`RateLimiter`] lets at most one action through per time window and drops
//!   the rest. Reopening is driven by an injected [`Scheduler`].
//! - [`UploadBatchTracker`] owns the batch for one compose session. Every update
//!   is routed by [`RecordId`], never by position, and publishes a fresh
//!   immutable [`UploadBatch`] snapshot to subscribers.
//! - [`BatchUploader`] runs the uploads of a batch concurrently against a
//!   [`dropper_storage::Storage`] and builds the outgoing message once the batch
//!   is finalized.

pub mod batch;
pub mod rate_limiter;
pub mod record;
pub mod scheduler;
pub mod tracker;
pub mod uploader;

pub use batch::{FinalizedBatch, SkipReason, SkippedFile, UploadBatch};
pub use rate_limiter::{RateLimiter, RateLimiterError};
pub use record::{RecordId, RecordState, UploadError, UploadRecord};
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
pub use tracker::{TrackerError, UploadBatchTracker};
pub use uploader::{BatchUploader, ComposedMessage, UploadSettings, UploadSummary};
