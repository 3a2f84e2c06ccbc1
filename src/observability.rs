//! Tracing setup and in-process counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber
///
/// `RUST_LOG` wins over the configured filter.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedded use) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    items_completed: AtomicU64,
    items_failed: AtomicU64,
    items_recovered: AtomicU64,
    batches_run: AtomicU64,
    invocation_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_completed(&self) {
        self.items_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "items_completed", "Metric incremented");
    }

    pub fn item_failed(&self) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "items_failed", "Metric incremented");
    }

    pub fn items_recovered(&self, count: u64) {
        self.items_recovered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn batch_run(&self) {
        self.batches_run.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "batches_run", "Metric incremented");
    }

    pub fn invocation_failed(&self) {
        self.invocation_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "invocation_failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_completed: self.items_completed.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            items_recovered: self.items_recovered.load(Ordering::Relaxed),
            batches_run: self.batches_run.load(Ordering::Relaxed),
            invocation_failures: self.invocation_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub items_completed: u64,
    pub items_failed: u64,
    pub items_recovered: u64,
    pub batches_run: u64,
    pub invocation_failures: u64,
}
