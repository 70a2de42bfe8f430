//! Queue statistics: monotonic counters plus derived point-in-time views.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonic lifecycle counters (low overhead, coarse-grained).
///
/// Reset only by an explicit `clear`; otherwise they increase for the
/// life of the process.
#[derive(Debug, Default)]
pub struct QueueCounters {
    pub added: AtomicU64,
    pub processed: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
    pub dropped: AtomicU64,
    pub last_persisted: AtomicU64,
}

/// Serializable snapshot of the counters; the `stats` block of the
/// persisted snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CountersSnapshot {
    pub added: u64,
    pub processed: u64,
    pub failed: u64,
    pub retried: u64,
    pub dropped: u64,
    pub last_persisted: u64,
}

impl QueueCounters {
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            added: self.added.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            last_persisted: self.last_persisted.load(Ordering::Relaxed),
        }
    }

    /// Replaces every counter, used when restoring a snapshot.
    pub fn restore(&self, s: &CountersSnapshot) {
        self.added.store(s.added, Ordering::Relaxed);
        self.processed.store(s.processed, Ordering::Relaxed);
        self.failed.store(s.failed, Ordering::Relaxed);
        self.retried.store(s.retried, Ordering::Relaxed);
        self.dropped.store(s.dropped, Ordering::Relaxed);
        self.last_persisted.store(s.last_persisted, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.restore(&CountersSnapshot::default());
    }
}

/// Point-in-time view over the ledger and counters.
///
/// Derived on demand; computing it never mutates queue state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    /// Current ledger size.
    pub size: usize,
    /// Items eligible for the next processing cycle.
    pub ready: usize,
    /// Items waiting out their backoff.
    pub retrying: usize,
    /// Items currently marked processing.
    pub processing: usize,
    #[serde(flatten)]
    pub counters: CountersSnapshot,
    /// Milliseconds since the last successful persist, if any.
    pub since_last_persist_ms: Option<u64>,
    /// `round(size / max_size * 100)`.
    pub utilization_percent: u32,
}

pub(crate) fn utilization_percent(size: usize, max_size: usize) -> u32 {
    if max_size == 0 {
        return 0;
    }
    (size as f64 / max_size as f64 * 100.0).round() as u32
}
