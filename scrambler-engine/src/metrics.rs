use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use scrambler_common::as_micros_saturating;

/// The default number of latency samples kept for the rolling statistics.
pub const DEFAULT_LATENCY_SAMPLES: usize = 1000;

/// Engine counters and the rolling latency sample. Shared between the decision path,
/// the delivery driver and the control surface.
#[derive(Debug)]
pub struct Metrics {
    /// Total messages discarded: loss, burst loss and queue evictions.
    dropped: AtomicU64,
    /// Total messages routed through the reorder buffer.
    reordered: AtomicU64,
    /// Total messages whose coordinates were perturbed.
    corrupted: AtomicU64,
    /// Most recent send latencies in microseconds, oldest first.
    latencies: Mutex<VecDeque<u64>>,
    /// Maximum number of latency samples.
    capacity: usize,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY_SAMPLES)
    }
}

impl Metrics {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            dropped: AtomicU64::new(0),
            reordered: AtomicU64::new(0),
            corrupted: AtomicU64::new(0),
            latencies: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    #[inline]
    pub(crate) fn increment_dropped(&self) {
        self.add_dropped(1);
    }

    #[inline]
    pub(crate) fn add_dropped(&self, n: u64) {
        if n > 0 {
            self.dropped.fetch_add(n, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn increment_reordered(&self) {
        self.reordered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_corrupted(&self) {
        self.corrupted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a send latency, evicting the oldest sample once the window is full.
    pub fn record_latency(&self, latency: Duration) {
        self.record_latency_us(as_micros_saturating(latency));
    }

    pub fn record_latency_us(&self, latency_us: u64) {
        let mut latencies = self.latencies.lock();
        if latencies.len() == self.capacity {
            latencies.pop_front();
        }
        latencies.push_back(latency_us);
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reordered(&self) -> u64 {
        self.reordered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn corrupted(&self) -> u64 {
        self.corrupted.load(Ordering::Relaxed)
    }

    /// Number of latency samples currently held.
    pub fn samples(&self) -> usize {
        self.latencies.lock().len()
    }

    /// Computes a snapshot. `queued` and `bytes_per_sec` are instantaneous readings supplied
    /// by the scheduler and the bandwidth limiter.
    pub fn snapshot(&self, queued: usize, bytes_per_sec: u64) -> MetricsSnapshot {
        let mut samples: Vec<u64> = self.latencies.lock().iter().copied().collect();

        let avg_latency_us = if samples.is_empty() {
            0
        } else {
            let sum: u128 = samples.iter().map(|&s| s as u128).sum();
            (sum / samples.len() as u128) as u64
        };

        samples.sort_unstable();

        MetricsSnapshot {
            dropped: self.dropped(),
            reordered: self.reordered(),
            queued: queued as u64,
            bytes_per_sec,
            avg_latency_us,
            p95_latency_us: nearest_rank(&samples, 0.95),
            corrupted: self.corrupted(),
        }
    }
}

/// Returns the nearest-rank percentile of an ascending-sorted sample: the value at index
/// `floor(p * n)`, clamped to `n - 1`. Returns 0 for an empty sample.
pub fn nearest_rank(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }

    let idx = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// A point-in-time view of the engine metrics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub dropped: u64,
    pub reordered: u64,
    /// Current delay queue depth.
    pub queued: u64,
    /// Bytes reserved in the current bandwidth window.
    pub bytes_per_sec: u64,
    pub avg_latency_us: u64,
    pub p95_latency_us: u64,
    pub corrupted: u64,
}
