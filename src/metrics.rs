//! Operation counters reported by the indexer.
//!
//! The indexer never owns global counters; it reports to whatever
//! [`MetricsSink`] it was built with, so an exporter (Prometheus, StatsD, a
//! log line) can be wired in by the embedding service.

use std::sync::atomic::{AtomicU64, Ordering};

pub trait MetricsSink: Send + Sync {
    /// A new data point was stored, or staged in a caller-owned transaction.
    fn inc_stored(&self);

    /// An indexer operation failed.
    fn inc_error(&self);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn inc_stored(&self) {}

    fn inc_error(&self) {}
}

/// In-process atomic counters.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    stored: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub stored: u64,
    pub errors: u64,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            stored: self.stored.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for CounterMetrics {
    fn inc_stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}
