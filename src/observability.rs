//! Lock-free counters for forwarding, retrieval and delivery.
//!
//! Recording is a relaxed atomic add; it never blocks or fails the caller.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    requests_forwarded: AtomicU64,
    gateway_timeouts: AtomicU64,
    policy_violations: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    assets_committed: AtomicU64,
    retrieval_failures: AtomicU64,
    assets_delivered: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_forwarded(&self, route: &str, sent: u64, received: u64) {
        self.requests_forwarded.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(sent, Ordering::Relaxed);
        self.bytes_received.fetch_add(received, Ordering::Relaxed);
        tracing::debug!(route, bytes_sent = sent, bytes_received = received, "Routed request to third party");
    }

    pub fn gateway_timeout(&self) {
        self.gateway_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "gateway_timeouts", "Metric incremented");
    }

    pub fn policy_violation(&self) {
        self.policy_violations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "policy_violations", "Metric incremented");
    }

    pub fn asset_committed(&self) {
        self.assets_committed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "assets_committed", "Metric incremented");
    }

    pub fn retrieval_failed(&self) {
        self.retrieval_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "retrieval_failures", "Metric incremented");
    }

    pub fn asset_delivered(&self, asset: &str, size: u64) {
        self.assets_delivered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(asset, bytes_sent = size, "Delivered third party asset");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_forwarded: self.requests_forwarded.load(Ordering::Relaxed),
            gateway_timeouts: self.gateway_timeouts.load(Ordering::Relaxed),
            policy_violations: self.policy_violations.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            assets_committed: self.assets_committed.load(Ordering::Relaxed),
            retrieval_failures: self.retrieval_failures.load(Ordering::Relaxed),
            assets_delivered: self.assets_delivered.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_forwarded: u64,
    pub gateway_timeouts: u64,
    pub policy_violations: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub assets_committed: u64,
    pub retrieval_failures: u64,
    pub assets_delivered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_accumulates() {
        let metrics = Metrics::new();
        metrics.request_forwarded("example", 10, 200);
        metrics.request_forwarded("example", 5, 0);
        metrics.gateway_timeout();
        metrics.asset_committed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_forwarded, 2);
        assert_eq!(snapshot.bytes_sent, 15);
        assert_eq!(snapshot.bytes_received, 200);
        assert_eq!(snapshot.gateway_timeouts, 1);
        assert_eq!(snapshot.assets_committed, 1);
        assert_eq!(snapshot.policy_violations, 0);
    }
}
