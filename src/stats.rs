//! Statistics tracking for the responder.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic statistics for tracking responder activity.
pub struct Stats {
    pub requests: AtomicU64,
    pub answered_txt: AtomicU64,
    pub answered_empty: AtomicU64,
    pub dropped: AtomicU64,
    pub inference_failures: AtomicU64,
    /// Cumulative handling time in microseconds for averaging.
    total_response_time_us: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            answered_txt: AtomicU64::new(0),
            answered_empty: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            inference_failures: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
        }
    }

    pub fn record_txt(&self, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.answered_txt.fetch_add(1, Ordering::Relaxed);
        self.add_time(response_time_ms);
    }

    pub fn record_empty(&self, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.answered_empty.fetch_add(1, Ordering::Relaxed);
        self.add_time(response_time_ms);
    }

    pub fn record_dropped(&self, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.add_time(response_time_ms);
    }

    /// Counted on top of the TXT answer the failed query still produces.
    pub fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn add_time(&self, response_time_ms: f64) {
        self.total_response_time_us
            .fetch_add((response_time_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let answered_txt = self.answered_txt.swap(0, Ordering::Relaxed);
        let answered_empty = self.answered_empty.swap(0, Ordering::Relaxed);
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        let inference_failures = self.inference_failures.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let avg_response_ms = if requests > 0 {
            (total_us as f64 / requests as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            requests,
            answered_txt,
            answered_empty,
            dropped,
            inference_failures,
            avg_response_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub answered_txt: u64,
    pub answered_empty: u64,
    pub dropped: u64,
    pub inference_failures: u64,
    pub avg_response_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_averages_and_resets() {
        let stats = Stats::new();
        stats.record_txt(3.0);
        stats.record_empty(1.0);
        stats.record_dropped(2.0);
        stats.record_inference_failure();

        let snap = stats.snapshot_and_reset();
        assert_eq!(snap.requests, 3);
        assert_eq!(snap.answered_txt, 1);
        assert_eq!(snap.answered_empty, 1);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.inference_failures, 1);
        assert!((snap.avg_response_ms - 2.0).abs() < 1e-9);

        let empty = stats.snapshot_and_reset();
        assert_eq!(empty.requests, 0);
        assert_eq!(empty.avg_response_ms, 0.0);
    }
}
