//! Window-based rate limiter for progress callbacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::scheduler::Scheduler;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimiterError {
    #[error("Rate limiter window must be non-negative, got {0} ms")]
    NegativeWindow(i64),
}

/// Lets at most one action through per window.
///
/// The limiter starts open. An accepted `attempt` closes it and schedules a
/// reopen `window` later; attempts while closed are dropped, not queued. Only
/// the scheduled reopen can open the window again. A zero window never closes.
///
/// Clones share the same window.
#[derive(Clone)]
pub struct RateLimiter {
    window: Duration,
    open: Arc<AtomicBool>,
    scheduler: Arc<dyn Scheduler>,
}

impl RateLimiter {
    pub fn new(window_millis: i64, scheduler: Arc<dyn Scheduler>) -> Result<Self, RateLimiterError> {
        let millis =
            u64::try_from(window_millis).map_err(|_| RateLimiterError::NegativeWindow(window_millis))?;
        Ok(Self::from_duration(Duration::from_millis(millis), scheduler))
    }

    pub fn from_duration(window: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            window,
            open: Arc::new(AtomicBool::new(true)),
            scheduler,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_open(&self) -> bool {
        self.window.is_zero() || self.open.load(Ordering::Acquire)
    }

    /// Run `action` now if the window is open. Returns whether it ran.
    pub fn attempt<F: FnOnce()>(&self, action: F) -> bool {
        if self.window.is_zero() {
            action();
            return true;
        }

        if self
            .open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!(window_ms = self.window.as_millis() as u64, "Rate limited");
            return false;
        }

        let open = self.open.clone();
        self.scheduler
            .schedule_after(self.window, Box::new(move || open.store(true, Ordering::Release)));

        action();
        true
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.window)
            .field("open", &self.is_open())
            .finish()
    }
}
