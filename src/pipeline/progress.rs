//! Batch progress tracking
//!
//! [`ProgressState`] counts applied files (written by the apply stage) and
//! dropped files (any file-path stage that gave up on one). [`ProgressMonitor`]
//! polls it and fires the completion callback once per batch.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::presenter::Presenter;

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub dropped: usize,
    pub total: usize,
    pub active: bool,
}

impl ProgressSnapshot {
    /// Percentage complete; an empty batch counts as done
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }

    /// Every file is accounted for, applied or dropped
    ///
    /// A settled batch with drops never reaches 100% and never signals
    /// completion.
    pub fn is_settled(&self) -> bool {
        self.completed + self.dropped >= self.total
    }
}

#[derive(Debug, Default)]
struct Counts {
    completed: usize,
    dropped: usize,
    total: usize,
    active: bool,
}

impl Counts {
    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed,
            dropped: self.dropped,
            total: self.total,
            active: self.active,
        }
    }
}

/// Shared completed/total counters for the current batch
///
/// Invariant: `completed + dropped <= total`.
#[derive(Debug, Default)]
pub struct ProgressState {
    counts: Mutex<Counts>,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new batch of `total` files
    pub fn reset(&self, total: usize) {
        let mut counts = self.lock();
        counts.completed = 0;
        counts.dropped = 0;
        counts.total = total;
        counts.active = true;
    }

    /// Count one applied file; saturates at `total`
    pub fn record_completion(&self) -> ProgressSnapshot {
        let mut counts = self.lock();
        if counts.completed + counts.dropped < counts.total {
            counts.completed += 1;
        } else {
            log::warn!(
                "Completion reported beyond batch total ({}+{}/{})",
                counts.completed,
                counts.dropped,
                counts.total
            );
        }
        counts.snapshot()
    }

    /// Count one file that will never be applied; saturates at `total`
    pub fn record_drop(&self) -> ProgressSnapshot {
        let mut counts = self.lock();
        if counts.completed + counts.dropped < counts.total {
            counts.dropped += 1;
        }
        counts.snapshot()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().snapshot()
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Mark the batch finished if every file is done
    ///
    /// Returns true exactly once per batch: on the call that flips it inactive.
    pub fn try_finish(&self) -> bool {
        let mut counts = self.lock();
        if counts.active && counts.completed >= counts.total {
            counts.active = false;
            true
        } else {
            false
        }
    }
}

/// Background poller that signals batch completion
pub struct ProgressMonitor {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ProgressMonitor {
    /// Start polling every `interval`
    pub fn spawn(progress: Arc<ProgressState>, presenter: Arc<dyn Presenter>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if progress.try_finish() {
                            log::info!("Batch complete");
                            presenter.show_completion();
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            log::debug!("Progress monitor stopped");
        });

        Self { shutdown, handle }
    }

    /// Stop polling and wait for the poller to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            log::error!("Progress monitor task failed: {:?}", e);
        }
    }
}
