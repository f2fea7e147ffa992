//! Bounded-memory latency sampling.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::queue::duration_ms;

/// Percentile summary of the current sample window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    #[serde(serialize_with = "serialize_micros")]
    pub p50: Duration,
    #[serde(serialize_with = "serialize_micros")]
    pub p95: Duration,
    #[serde(serialize_with = "serialize_micros")]
    pub p99: Duration,
    #[serde(serialize_with = "serialize_micros")]
    pub max: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_micros<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_micros().min(u128::from(u64::MAX)) as u64)
}

/// Ring buffer of the most recent dispatch latencies.
///
/// Holds at most `window` samples; the oldest is evicted first.
#[derive(Debug)]
pub struct LatencyTracker {
    samples: Mutex<VecDeque<Duration>>,
    window: usize,
    warn_threshold: Duration,
    slow_samples: AtomicU64,
}

impl LatencyTracker {
    #[must_use]
    pub fn new(window: usize, warn_threshold: Duration) -> Self {
        let window = window.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(window)),
            window,
            warn_threshold,
            slow_samples: AtomicU64::new(0),
        }
    }

    /// Records one sample. Samples above the warn threshold are logged, never raised.
    pub fn record(&self, latency: Duration) {
        {
            let mut samples = self.samples.lock();
            if samples.len() == self.window {
                let _ = samples.pop_front();
            }
            samples.push_back(latency);
        }

        if latency > self.warn_threshold {
            let slow = self.slow_samples.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                latency_ms = duration_ms(latency),
                threshold_ms = duration_ms(self.warn_threshold),
                slow_samples = slow,
                "event dispatch exceeded latency budget"
            );
        }
    }

    /// Nearest-rank percentile over the current window.
    ///
    /// `p` is clamped to `1..=100`. Returns zero when no samples exist.
    #[must_use]
    pub fn percentile(&self, p: u8) -> Duration {
        let mut values: Vec<Duration> = self.samples.lock().iter().copied().collect();
        values.sort_unstable();
        nearest_rank(&values, p)
    }

    #[must_use]
    pub fn summary(&self) -> LatencySummary {
        let mut values: Vec<Duration> = self.samples.lock().iter().copied().collect();
        values.sort_unstable();
        LatencySummary {
            count: values.len(),
            p50: nearest_rank(&values, 50),
            p95: nearest_rank(&values, 95),
            p99: nearest_rank(&values, 99),
            max: values.last().copied().unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    /// Total samples that breached the warn threshold since creation.
    #[must_use]
    pub fn slow_samples(&self) -> u64 {
        self.slow_samples.load(Ordering::Relaxed)
    }
}

fn nearest_rank(sorted: &[Duration], p: u8) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let p = usize::from(p.clamp(1, 100));
    let rank = (sorted.len() * p).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn percentile_of_known_set() {
        let tracker = LatencyTracker::new(100, ms(50));
        // Insert 1..=100ms in scrambled order.
        for i in 0..100u64 {
            tracker.record(ms((i * 37) % 100 + 1));
        }
        assert_eq!(tracker.len(), 100);
        assert_eq!(tracker.percentile(95), ms(95));
        assert_eq!(tracker.percentile(50), ms(50));
        assert_eq!(tracker.percentile(100), ms(100));
        assert_eq!(tracker.percentile(1), ms(1));
    }

    #[test]
    fn window_evicts_oldest() {
        let tracker = LatencyTracker::new(3, ms(50));
        for v in [10, 20, 30, 1] {
            tracker.record(ms(v));
        }
        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.percentile(100), ms(30));
        assert_eq!(tracker.percentile(1), ms(1));
    }

    #[test]
    fn empty_tracker_reports_zero() {
        let tracker = LatencyTracker::new(10, ms(50));
        assert!(tracker.is_empty());
        assert_eq!(tracker.percentile(95), Duration::ZERO);
        assert_eq!(tracker.summary(), LatencySummary::default());
    }

    #[test]
    fn slow_samples_are_counted() {
        let tracker = LatencyTracker::new(10, ms(50));
        tracker.record(ms(10));
        tracker.record(ms(51));
        tracker.record(ms(50));
        assert_eq!(tracker.slow_samples(), 1);
        assert_eq!(tracker.summary().max, ms(51));
    }
}
