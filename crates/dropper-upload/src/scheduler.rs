//! Deferred execution used by the rate limiter to reopen its window.
//!
//! `TokioScheduler` sleeps on the runtime timer. `ManualScheduler` runs on a
//! simulated clock that only moves when `advance` is called.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::{Handle, TryCurrentError};

/// A one-shot task to run after a delay.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// "Run this after `delay`" capability.
pub trait Scheduler: Send + Sync {
    fn schedule_after(&self, delay: Duration, task: Task);
}

/// Scheduler backed by a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler for the runtime the caller is running on.
    pub fn current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

struct Pending {
    due: Duration,
    seq: u64,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    pending: Vec<Pending>,
}

/// Scheduler driven by a simulated clock.
///
/// Tasks run only inside [`ManualScheduler::advance`], in deadline order (ties
/// in scheduling order), on the calling thread.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the simulated clock.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of tasks not yet run.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Move the clock forward, running every task that falls due.
    ///
    /// Tasks scheduled by a running task are eligible in the same call if
    /// their deadline is within the advanced range.
    pub fn advance(&self, by: Duration) {
        let target = self.lock().now + by;

        loop {
            let next = {
                let mut state = self.lock();
                let due = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by_key(|(_, p)| (p.due, p.seq))
                    .map(|(index, _)| index);
                match due {
                    Some(index) => {
                        let pending = state.pending.swap_remove(index);
                        state.now = pending.due;
                        Some(pending.task)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };

            match next {
                Some(task) => task(),
                None => break,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) {
        let mut state = self.lock();
        let due = state.now + delay;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push(Pending { due, seq, task });
    }
}
