//! Pipeline performance metrics
//!
//! Hot-path counters are plain atomics: the latency average is an
//! exponential moving average with smoothing 1/16, the maximum is a CAS
//! loop that only moves up. An HDR histogram behind a mutex backs the
//! percentile report off the hot path.

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Highest latency the histogram can record (one minute)
const HISTOGRAM_MAX_NS: u64 = 60_000_000_000;

/// Aggregator-side performance counters
pub struct PerformanceMetrics {
    messages_processed: AtomicU64,
    avg_latency_ns: AtomicU64,
    max_latency_ns: AtomicU64,
    queue_depth: AtomicU64,
    histogram: Mutex<Histogram<u64>>,
}

impl PerformanceMetrics {
    /// Create zeroed metrics
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages_processed: AtomicU64::new(0),
            avg_latency_ns: AtomicU64::new(0),
            max_latency_ns: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            histogram: Mutex::new(
                Histogram::new_with_bounds(1, HISTOGRAM_MAX_NS, 3)
                    .unwrap_or_else(|_| Histogram::new(2).expect("valid histogram sigfig")),
            ),
        }
    }

    /// Record one processed message and its queue-to-book latency
    #[inline]
    pub fn record_latency(&self, latency_ns: u64) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);

        let current_avg = self.avg_latency_ns.load(Ordering::Relaxed);
        let new_avg = (current_avg * 15 + latency_ns) / 16;
        self.avg_latency_ns.store(new_avg, Ordering::Relaxed);

        let mut current_max = self.max_latency_ns.load(Ordering::Relaxed);
        while latency_ns > current_max {
            match self.max_latency_ns.compare_exchange_weak(
                current_max,
                latency_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current_max = observed,
            }
        }

        let _ = self.histogram.lock().record(latency_ns.max(1));
    }

    /// Publish the instantaneous queue depth
    #[inline]
    pub fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    /// Messages processed since start
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    /// Smoothed average latency in nanoseconds
    #[must_use]
    pub fn avg_latency_ns(&self) -> u64 {
        self.avg_latency_ns.load(Ordering::Relaxed)
    }

    /// Highest latency observed, in nanoseconds
    #[must_use]
    pub fn max_latency_ns(&self) -> u64 {
        self.max_latency_ns.load(Ordering::Relaxed)
    }

    /// Last published queue depth
    #[must_use]
    pub fn queue_depth(&self) -> u64 {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Point-in-time snapshot including histogram percentiles
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let histogram = self.histogram.lock();
        MetricsSnapshot {
            messages_processed: self.messages_processed(),
            avg_latency_ns: self.avg_latency_ns(),
            max_latency_ns: self.max_latency_ns(),
            queue_depth: self.queue_depth(),
            p50_ns: histogram.value_at_percentile(50.0),
            p90_ns: histogram.value_at_percentile(90.0),
            p99_ns: histogram.value_at_percentile(99.0),
            p999_ns: histogram.value_at_percentile(99.9),
        }
    }

    /// Zero every counter and drop the recorded histogram
    pub fn reset(&self) {
        self.messages_processed.store(0, Ordering::Relaxed);
        self.avg_latency_ns.store(0, Ordering::Relaxed);
        self.max_latency_ns.store(0, Ordering::Relaxed);
        self.queue_depth.store(0, Ordering::Relaxed);
        self.histogram.lock().reset();
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time metrics view
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    /// Messages processed since start
    pub messages_processed: u64,
    /// Smoothed average latency
    pub avg_latency_ns: u64,
    /// Highest latency observed
    pub max_latency_ns: u64,
    /// Last published queue depth
    pub queue_depth: u64,
    /// Median latency
    pub p50_ns: u64,
    /// 90th percentile latency
    pub p90_ns: u64,
    /// 99th percentile latency
    pub p99_ns: u64,
    /// 99.9th percentile latency
    pub p999_ns: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_converges_toward_constant_samples() {
        let metrics = PerformanceMetrics::new();
        for _ in 0..200 {
            metrics.record_latency(1_600);
        }
        let avg = metrics.avg_latency_ns();
        assert!(avg > 1_500 && avg <= 1_600, "avg = {avg}");
        assert_eq!(metrics.messages_processed(), 200);
    }

    #[test]
    fn max_only_moves_up() {
        let metrics = PerformanceMetrics::new();
        metrics.record_latency(500);
        metrics.record_latency(5_000);
        metrics.record_latency(100);
        assert_eq!(metrics.max_latency_ns(), 5_000);
    }

    #[test]
    fn snapshot_carries_percentiles() {
        let metrics = PerformanceMetrics::new();
        for i in 1..=1_000u64 {
            metrics.record_latency(i);
        }
        let snap = metrics.snapshot();
        assert!(snap.p50_ns >= 450 && snap.p50_ns <= 550, "p50 = {}", snap.p50_ns);
        assert!(snap.p99_ns >= 950, "p99 = {}", snap.p99_ns);
        assert!(snap.p999_ns <= snap.max_latency_ns.max(1_001));
    }

    #[test]
    fn reset_zeroes_everything() {
        let metrics = PerformanceMetrics::new();
        metrics.record_latency(42);
        metrics.set_queue_depth(9);
        metrics.reset();
        assert_eq!(metrics.messages_processed(), 0);
        assert_eq!(metrics.avg_latency_ns(), 0);
        assert_eq!(metrics.max_latency_ns(), 0);
        assert_eq!(metrics.queue_depth(), 0);
        assert_eq!(metrics.snapshot().p99_ns, 0);
    }
}
