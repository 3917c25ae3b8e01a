use std::sync::atomic::{AtomicU64, Ordering};

/// Per-stage sent/received/failed/dropped counters (§2 Observability): a
/// handful of relaxed atomics a worker bumps inline on its hot path,
/// snapshotted on demand rather than streamed.
#[derive(Default)]
pub struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of [`Counters`], suitable for a `/stats`-style
/// diagnostic endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    pub sent: u64,
    pub received: u64,
    pub failed: u64,
    pub dropped: u64,
}
