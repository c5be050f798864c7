//! Stage counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct StageStats {
    enqueued: AtomicU64,
    rejected: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    replied: AtomicU64,
    total_queue_wait_ms: AtomicU64,
}

impl StageStats {
    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_processed(&self, queue_wait_ms: u64) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.total_queue_wait_ms
            .fetch_add(queue_wait_ms, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replied(&self) {
        self.replied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queued: usize) -> StageStatsSnapshot {
        let processed = self.processed.load(Ordering::Relaxed);
        let total_wait = self.total_queue_wait_ms.load(Ordering::Relaxed);
        StageStatsSnapshot {
            queued,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            processed,
            failed: self.failed.load(Ordering::Relaxed),
            replied: self.replied.load(Ordering::Relaxed),
            average_queue_wait_ms: if processed > 0 {
                total_wait as f64 / processed as f64
            } else {
                0.0
            },
        }
    }
}

/// Point-in-time view of a stage's counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatsSnapshot {
    /// Items currently waiting in the queue
    pub queued: usize,
    pub enqueued: u64,
    /// Enqueue attempts refused because the queue stayed full
    pub rejected: u64,
    /// Items whose component invocation succeeded
    pub processed: u64,
    pub failed: u64,
    pub replied: u64,
    pub average_queue_wait_ms: f64,
}

impl StageStatsSnapshot {
    /// Items taken off the queue, whatever the outcome
    pub fn completed(&self) -> u64 {
        self.processed + self.failed
    }
}
