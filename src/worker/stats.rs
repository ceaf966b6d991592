//! Batch counters shared by the worker loop and the completion poller

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cumulative counters for one worker process
///
/// The worker loop and the poller both record outcomes; per-batch summaries
/// are computed as deltas between snapshots.
#[derive(Debug, Default)]
pub struct BatchStats {
    processed: AtomicUsize,
    success: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl BatchStats {
    /// One item fully processed and ingested
    pub fn record_success(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    /// One item fully attempted but not ingested
    pub fn record_failure(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Items lost to claim races during candidate selection
    pub fn record_skipped(&self, count: usize) {
        self.skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatsSnapshot {
    /// Counter movement since an earlier snapshot
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed - earlier.processed,
            success: self.success - earlier.success,
            failed: self.failed - earlier.failed,
            skipped: self.skipped - earlier.skipped,
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {}, success {}, failed {}, skipped {}",
            self.processed, self.success, self.failed, self.skipped
        )
    }
}
