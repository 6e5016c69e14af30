use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    succeeded: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    flushes: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
}

/// Run-wide counters shared by workers, the retry loop and the sink.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
    pub flushes: u64,
    pub in_flight: u64,
    pub peak_in_flight: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_succeeded(&self, count: u64) {
        self.inner.succeeded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_failed(&self, count: u64) {
        self.inner.failed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_flushes(&self, count: u64) {
        self.inner.flushes.fetch_add(count, Ordering::Relaxed);
    }

    /// Marks one fetch as started and records the concurrency high-water mark.
    pub fn begin_fetch(&self) {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    pub fn end_fetch(&self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            succeeded: self.inner.succeeded.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
            flushes: self.inner.flushes.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.inner.peak_in_flight.load(Ordering::SeqCst),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
