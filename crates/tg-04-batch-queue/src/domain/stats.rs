//! # Queue Counters
//!
//! Counters cover the interval since the last stats log line, which
//! resets them.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Live counters of one queue.
#[derive(Debug, Default)]
pub struct QueueStats {
    pending: AtomicUsize,
    added: AtomicUsize,
    saved: AtomicUsize,
    failed: AtomicUsize,
}

/// Point in time copy of [`QueueStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatsSnapshot {
    /// Items waiting for the worker.
    pub queue_size: usize,
    /// Items enqueued.
    pub added: usize,
    /// Items written.
    pub saved: usize,
    /// Items whose batch failed.
    pub failed: usize,
}

impl QueueStatsSnapshot {
    /// True when there is nothing to report.
    pub fn is_idle(&self) -> bool {
        self.queue_size == 0 && self.added == 0 && self.saved == 0 && self.failed == 0
    }
}

impl QueueStats {
    pub(crate) fn record_added(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.added.fetch_add(1, Ordering::Relaxed);
    }

    /// Reverts `record_added` for an item the worker never received.
    pub(crate) fn record_withdrawn(&self) {
        self.pending.fetch_sub(1, Ordering::Relaxed);
        // A stats log line may have reset `added` in between.
        let _ = self
            .added
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub(crate) fn record_taken(&self, count: usize) {
        self.pending.fetch_sub(count, Ordering::Relaxed);
    }

    pub(crate) fn record_saved(&self, count: usize) {
        self.saved.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, count: usize) {
        self.failed.fetch_add(count, Ordering::Relaxed);
    }

    /// Current values.
    pub fn snapshot(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            queue_size: self.pending.load(Ordering::Relaxed),
            added: self.added.load(Ordering::Relaxed),
            saved: self.saved.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Current values, resetting the interval counters.
    pub fn take(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            queue_size: self.pending.load(Ordering::Relaxed),
            added: self.added.swap(0, Ordering::Relaxed),
            saved: self.saved.swap(0, Ordering::Relaxed),
            failed: self.failed.swap(0, Ordering::Relaxed),
        }
    }
}
