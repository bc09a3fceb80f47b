//! Replication Metrics
//!
//! Write, delivery and timeout counters plus replication lag tracking.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::cluster::NodeId;

/// Lag statistics for a single follower
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowerLag {
    /// Events applied by the follower
    pub applied: u64,
    /// Delivery attempts to this follower that timed out
    pub timeouts: u64,
    /// Lag of the most recently applied event, in microseconds
    pub last_lag_us: u64,
    /// Worst lag observed, in microseconds
    pub max_lag_us: u64,
}

/// Metrics collector shared by every node of one topology
#[derive(Debug)]
pub struct Metrics {
    /// Leader writes committed locally
    writes: AtomicU64,
    /// Events successfully enqueued onto a follower channel
    deliveries: AtomicU64,
    /// Delivery attempts abandoned at the deadline
    timeouts: AtomicU64,
    /// Delivery attempts that found the channel closed
    closed: AtomicU64,

    /// Lag tracking across all followers
    lag_sum_us: AtomicU64,
    lag_count: AtomicU64,
    lag_min_us: AtomicU64,
    lag_max_us: AtomicU64,

    /// Per-follower breakdown
    followers: DashMap<NodeId, FollowerLag>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            writes: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            closed: AtomicU64::new(0),
            lag_sum_us: AtomicU64::new(0),
            lag_count: AtomicU64::new(0),
            lag_min_us: AtomicU64::new(u64::MAX),
            lag_max_us: AtomicU64::new(0),
            followers: DashMap::new(),
        }
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivery attempt that hit its deadline
    pub fn record_timeout(&self, follower_id: NodeId) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        self.followers.entry(follower_id).or_default().timeouts += 1;
    }

    pub fn record_closed(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event applied on a follower along with its end-to-end lag
    pub fn record_applied(&self, follower_id: NodeId, lag: Duration) {
        let lag_us = lag.as_micros() as u64;
        self.lag_sum_us.fetch_add(lag_us, Ordering::Relaxed);
        self.lag_count.fetch_add(1, Ordering::Relaxed);

        // Update min (atomic min)
        let mut current_min = self.lag_min_us.load(Ordering::Relaxed);
        while lag_us < current_min {
            match self.lag_min_us.compare_exchange_weak(
                current_min,
                lag_us,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current_min = c,
            }
        }

        // Update max (atomic max)
        let mut current_max = self.lag_max_us.load(Ordering::Relaxed);
        while lag_us > current_max {
            match self.lag_max_us.compare_exchange_weak(
                current_max,
                lag_us,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current_max = c,
            }
        }

        let mut follower = self.followers.entry(follower_id).or_default();
        follower.applied += 1;
        follower.last_lag_us = lag_us;
        follower.max_lag_us = follower.max_lag_us.max(lag_us);
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }

    /// Total events applied across all followers
    pub fn applied(&self) -> u64 {
        self.lag_count.load(Ordering::Relaxed)
    }

    /// Get average lag in microseconds
    pub fn avg_lag_us(&self) -> f64 {
        let count = self.lag_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let sum = self.lag_sum_us.load(Ordering::Relaxed);
        sum as f64 / count as f64
    }

    /// Get min lag in microseconds
    pub fn min_lag_us(&self) -> u64 {
        let min = self.lag_min_us.load(Ordering::Relaxed);
        if min == u64::MAX {
            0
        } else {
            min
        }
    }

    /// Get max lag in microseconds
    pub fn max_lag_us(&self) -> u64 {
        self.lag_max_us.load(Ordering::Relaxed)
    }

    /// Lag statistics for one follower, if it has seen any activity
    pub fn follower(&self, follower_id: NodeId) -> Option<FollowerLag> {
        self.followers.get(&follower_id).map(|f| *f)
    }

    /// Per-follower statistics ordered by follower id
    pub fn followers(&self) -> Vec<(NodeId, FollowerLag)> {
        let mut all: Vec<_> = self
            .followers
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    /// Get a summary of metrics
    pub fn summary(&self) -> String {
        format!(
            "Writes: {} | Delivered: {} | Applied: {} | Timeouts: {} | Lag (ms): avg={:.1}, min={:.1}, max={:.1}",
            self.writes(),
            self.deliveries(),
            self.applied(),
            self.timeouts(),
            self.avg_lag_us() / 1000.0,
            self.min_lag_us() as f64 / 1000.0,
            self.max_lag_us() as f64 / 1000.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lag_tracking() {
        let metrics = Metrics::new();

        metrics.record_applied(1, Duration::from_micros(100));
        metrics.record_applied(1, Duration::from_micros(200));
        metrics.record_applied(2, Duration::from_micros(150));

        assert_eq!(metrics.applied(), 3);
        assert_eq!(metrics.min_lag_us(), 100);
        assert_eq!(metrics.max_lag_us(), 200);
        assert!((metrics.avg_lag_us() - 150.0).abs() < 0.1);

        let f1 = metrics.follower(1).unwrap();
        assert_eq!(f1.applied, 2);
        assert_eq!(f1.last_lag_us, 200);
        assert_eq!(f1.max_lag_us, 200);
        assert_eq!(metrics.follower(3), None);
    }

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        assert_eq!(metrics.min_lag_us(), 0);
        assert_eq!(metrics.avg_lag_us(), 0.0);

        metrics.record_write();
        metrics.record_delivery();
        metrics.record_delivery();
        metrics.record_timeout(3);
        metrics.record_closed();

        assert_eq!(metrics.writes(), 1);
        assert_eq!(metrics.deliveries(), 2);
        assert_eq!(metrics.timeouts(), 1);
        assert_eq!(metrics.closed(), 1);
        assert_eq!(metrics.follower(3).unwrap().timeouts, 1);
        assert_eq!(metrics.followers().len(), 1);
        assert!(metrics.summary().contains("Timeouts: 1"));
    }
}
