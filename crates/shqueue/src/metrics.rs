//! Optional metrics for observing queue activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters updated by `Ring::push`/`pop` and the open-retry loop.
///
/// Reading never requires synchronization with the producer/consumer
/// protocol: counters are independent atomics, relaxed throughout, since
/// they exist for observability, not correctness.
#[derive(Debug, Default)]
pub struct Metrics {
    bytes_pushed: AtomicU64,
    bytes_popped: AtomicU64,
    pushes: AtomicU64,
    pops: AtomicU64,
    open_retries: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_push(&self, n: usize) {
        self.bytes_pushed.fetch_add(n as u64, Ordering::Relaxed);
        self.pushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pop(&self, n: usize) {
        self.bytes_popped.fetch_add(n as u64, Ordering::Relaxed);
        self.pops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_open_retry(&self) {
        self.open_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the current counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_pushed: self.bytes_pushed.load(Ordering::Relaxed),
            bytes_popped: self.bytes_popped.load(Ordering::Relaxed),
            pushes: self.pushes.load(Ordering::Relaxed),
            pops: self.pops.load(Ordering::Relaxed),
            open_retries: self.open_retries.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of `Metrics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub bytes_pushed: u64,
    pub bytes_popped: u64,
    pub pushes: u64,
    pub pops: u64,
    pub open_retries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate() {
        let m = Metrics::new();
        m.record_push(10);
        m.record_push(5);
        m.record_pop(3);
        m.record_open_retry();

        let snap = m.snapshot();
        assert_eq!(snap.bytes_pushed, 15);
        assert_eq!(snap.pushes, 2);
        assert_eq!(snap.bytes_popped, 3);
        assert_eq!(snap.pops, 1);
        assert_eq!(snap.open_retries, 1);
    }
}
