//! Counters for the delegation backend.
//!
//! All counters are backed by atomics for lock-free concurrent access.

use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregated metrics for the oracle fulfiller and checkpoint relayer.
///
/// Thread-safe via atomics; shared as `Arc<Metrics>`.
#[derive(Default)]
pub struct Metrics {
    /// Randomness requests picked up by the listener.
    pub requests_received: AtomicU64,
    /// Requests fulfilled on the program.
    pub requests_fulfilled: AtomicU64,
    /// Requests skipped because the program rejected them permanently
    /// (already fulfilled, account closed).
    pub requests_skipped: AtomicU64,
    /// Fulfillment attempts that failed.
    pub requests_failed: AtomicU64,
    /// Sum of fulfillment latencies in milliseconds.
    pub fulfillment_latency_sum_ms: AtomicU64,

    /// Checkpoints picked up by the listener.
    pub checkpoints_received: AtomicU64,
    /// Checkpoints that advanced a base-layer account.
    pub checkpoints_applied: AtomicU64,
    /// Checkpoints that were already applied.
    pub checkpoints_replayed: AtomicU64,
    /// Relay attempts rejected as out of order and retried.
    pub checkpoint_retries: AtomicU64,
    /// Checkpoints that could not be applied.
    pub checkpoints_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful fulfillment with its latency.
    pub fn record_fulfillment(&self, latency_ms: u64) {
        self.requests_fulfilled.fetch_add(1, Ordering::Relaxed);
        self.fulfillment_latency_sum_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_skip(&self) {
        self.requests_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint(&self) {
        self.checkpoints_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint_applied(&self) {
        self.checkpoints_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint_replayed(&self) {
        self.checkpoints_replayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint_retry(&self) {
        self.checkpoint_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint_failure(&self) {
        self.checkpoints_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Average fulfillment latency in milliseconds, or 0 if none.
    pub fn avg_latency_ms(&self) -> u64 {
        let count = self.requests_fulfilled.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.fulfillment_latency_sum_ms.load(Ordering::Relaxed) / count
    }

    /// Serialize metrics as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "requests_received": self.requests_received.load(Ordering::Relaxed),
            "requests_fulfilled": self.requests_fulfilled.load(Ordering::Relaxed),
            "requests_skipped": self.requests_skipped.load(Ordering::Relaxed),
            "requests_failed": self.requests_failed.load(Ordering::Relaxed),
            "avg_fulfillment_latency_ms": self.avg_latency_ms(),
            "checkpoints_received": self.checkpoints_received.load(Ordering::Relaxed),
            "checkpoints_applied": self.checkpoints_applied.load(Ordering::Relaxed),
            "checkpoints_replayed": self.checkpoints_replayed.load(Ordering::Relaxed),
            "checkpoint_retries": self.checkpoint_retries.load(Ordering::Relaxed),
            "checkpoints_failed": self.checkpoints_failed.load(Ordering::Relaxed),
        })
    }
}
