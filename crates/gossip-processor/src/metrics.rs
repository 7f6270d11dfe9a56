//! Metrics counters for the inbound gossip path.
//!
//! Thread-safe, lock-free; safe to bump from any worker.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Node-wide counters maintained by the processor.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    /// Requests that could not be parsed.
    pub invalid_requests: Counter,
    /// Transaction payloads that failed validation or were blocklisted,
    /// counted once per delivering peer.
    pub invalid_transactions: Counter,
    /// Deliveries of payloads the node had already processed.
    pub known_transactions: Counter,
    /// Payloads hashed and accepted for the first time.
    pub new_transactions: Counter,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-peer counters embedded in each peer handle.
#[derive(Debug, Default)]
pub struct PeerMetrics {
    /// How often this peer re-sent material the node already had.
    pub known_transactions: Counter,
}
