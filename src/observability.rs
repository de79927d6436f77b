//! Tracing setup and in-process counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber
///
/// Honours `RUST_LOG`; defaults to `info` for everything. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    merges_completed: AtomicU64,
    merges_failed: AtomicU64,
    compose_calls: AtomicU64,
    cleanup_failures: AtomicU64,
    urls_signed: AtomicU64,
    files_served: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_completed(&self, compose_calls: usize, cleanup_failures: usize) {
        self.merges_completed.fetch_add(1, Ordering::Relaxed);
        self.compose_calls
            .fetch_add(compose_calls as u64, Ordering::Relaxed);
        self.cleanup_failures
            .fetch_add(cleanup_failures as u64, Ordering::Relaxed);
        tracing::debug!(counter = "merges_completed", "Metric incremented");
    }

    pub fn merge_failed(&self) {
        self.merges_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "merges_failed", "Metric incremented");
    }

    pub fn url_signed(&self) {
        self.urls_signed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "urls_signed", "Metric incremented");
    }

    pub fn file_served(&self) {
        self.files_served.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "files_served", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            merges_completed: self.merges_completed.load(Ordering::Relaxed),
            merges_failed: self.merges_failed.load(Ordering::Relaxed),
            compose_calls: self.compose_calls.load(Ordering::Relaxed),
            cleanup_failures: self.cleanup_failures.load(Ordering::Relaxed),
            urls_signed: self.urls_signed.load(Ordering::Relaxed),
            files_served: self.files_served.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub merges_completed: u64,
    pub merges_failed: u64,
    pub compose_calls: u64,
    pub cleanup_failures: u64,
    pub urls_signed: u64,
    pub files_served: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.merge_completed(3, 1);
        metrics.merge_completed(1, 0);
        metrics.merge_failed();
        metrics.url_signed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.merges_completed, 2);
        assert_eq!(snapshot.compose_calls, 4);
        assert_eq!(snapshot.cleanup_failures, 1);
        assert_eq!(snapshot.merges_failed, 1);
        assert_eq!(snapshot.urls_signed, 1);
        assert_eq!(snapshot.files_served, 0);
    }
}
