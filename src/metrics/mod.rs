//! Read-only metrics exposed to the tray UI, logs and status endpoints.

/// Latency ring buffer and percentiles.
pub mod latency;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::event::Priority;

pub use latency::{LatencySummary, LatencyTracker};

/// One counter per priority class.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PriorityCounts {
    pub critical: u64,
    pub normal: u64,
    pub low: u64,
}

impl PriorityCounts {
    pub(crate) fn from_fn(mut f: impl FnMut(Priority) -> u64) -> Self {
        Self {
            critical: f(Priority::Critical),
            normal: f(Priority::Normal),
            low: f(Priority::Low),
        }
    }

    #[must_use]
    pub const fn get(&self, priority: Priority) -> u64 {
        match priority {
            Priority::Critical => self.critical,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
        }
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.critical + self.normal + self.low
    }
}

/// Counters owned by the consumer side of the bus.
#[derive(Debug, Default)]
pub struct BusCounters {
    dispatched: AtomicU64,
    callback_failures: AtomicU64,
    discarded_on_shutdown: AtomicU64,
}

impl BusCounters {
    pub(crate) fn record_dispatch(&self, failures: usize) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        if failures > 0 {
            self.callback_failures.fetch_add(failures as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_discarded(&self, count: usize) {
        self.discarded_on_shutdown.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn callback_failures(&self) -> u64 {
        self.callback_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn discarded_on_shutdown(&self) -> u64 {
        self.discarded_on_shutdown.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of bus health.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub depth_by_priority: PriorityCounts,
    pub drops: PriorityCounts,
    pub submitted: u64,
    pub dispatched: u64,
    pub callback_failures: u64,
    pub discarded_on_shutdown: u64,
    pub slow_dispatches: u64,
    /// Latencies are serialized in microseconds.
    pub latency: LatencySummary,
}

impl MetricsSnapshot {
    /// Any CRITICAL event has been lost; collaborators should show a degraded state.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.drops.critical > 0
    }

    /// Serializes the snapshot for a status endpoint.
    ///
    /// # Errors
    ///
    /// Returns the underlying serializer error; not expected for this type.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_counts_index_and_total() {
        let counts = PriorityCounts::from_fn(|p| match p {
            Priority::Critical => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        });
        assert_eq!(counts.get(Priority::Normal), 2);
        assert_eq!(counts.total(), 6);
    }

    #[test]
    fn counters_accumulate() {
        let counters = BusCounters::default();
        counters.record_dispatch(0);
        counters.record_dispatch(2);
        counters.record_discarded(5);
        assert_eq!(counters.dispatched(), 2);
        assert_eq!(counters.callback_failures(), 2);
        assert_eq!(counters.discarded_on_shutdown(), 5);
    }

    #[test]
    fn snapshot_serializes_latency_in_micros() {
        let snapshot = MetricsSnapshot {
            queue_depth: 1,
            queue_capacity: 100,
            depth_by_priority: PriorityCounts::default(),
            drops: PriorityCounts { critical: 1, normal: 0, low: 0 },
            submitted: 3,
            dispatched: 2,
            callback_failures: 0,
            discarded_on_shutdown: 0,
            slow_dispatches: 0,
            latency: LatencySummary {
                count: 1,
                p50: std::time::Duration::from_millis(2),
                ..LatencySummary::default()
            },
        };
        assert!(snapshot.is_degraded());
        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["latency"]["p50"], 2000);
        assert_eq!(json["drops"]["critical"], 1);
    }
}
