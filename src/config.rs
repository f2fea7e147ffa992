//! Bus configuration.
//!
//! Supplied once at construction. Every blocking bound in the bus comes from here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Configuration for an [`EventBus`](crate::EventBus).
///
/// Missing fields fall back to their defaults when deserialized.
///
/// ```
/// use posture_bus::BusConfig;
///
/// let cfg = BusConfig::from_json(r#"{ "queue_capacity": 32 }"#).unwrap();
/// assert_eq!(cfg.queue_capacity, 32);
/// assert_eq!(cfg.lock_timeout_ms, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Maximum number of pending events across all priorities.
    pub queue_capacity: usize,
    /// How long a CRITICAL submit may wait for room.
    pub critical_block_timeout_ms: u64,
    /// Bound on every shared-state lock acquisition.
    pub lock_timeout_ms: u64,
    /// Dispatch latency above this is logged at WARN.
    pub latency_warn_threshold_ms: u64,
    /// Default TTL for cached derived statistics.
    pub stats_cache_ttl_s: u64,
    /// Number of latency samples retained.
    pub latency_sample_window: usize,
    /// How long the consumer keeps draining CRITICAL events on shutdown.
    pub shutdown_grace_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            critical_block_timeout_ms: 1000,
            lock_timeout_ms: 100,
            latency_warn_threshold_ms: 50,
            stats_cache_ttl_s: 60,
            latency_sample_window: 100,
            shutdown_grace_ms: 500,
        }
    }
}

impl BusConfig {
    /// Parses a config from JSON, filling unspecified fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` on malformed JSON or when the
    /// parsed values fail [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("malformed bus config: {e}"),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks that every bound is usable.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MustBePositive` naming the first zero field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let checks: [(&'static str, bool); 6] = [
            ("queue_capacity", self.queue_capacity > 0),
            ("critical_block_timeout_ms", self.critical_block_timeout_ms > 0),
            ("lock_timeout_ms", self.lock_timeout_ms > 0),
            ("latency_warn_threshold_ms", self.latency_warn_threshold_ms > 0),
            ("stats_cache_ttl_s", self.stats_cache_ttl_s > 0),
            ("latency_sample_window", self.latency_sample_window > 0),
        ];
        for (field, ok) in checks {
            if !ok {
                return Err(ValidationError::MustBePositive { field });
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn critical_block_timeout(&self) -> Duration {
        Duration::from_millis(self.critical_block_timeout_ms)
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    #[must_use]
    pub const fn latency_warn_threshold(&self) -> Duration {
        Duration::from_millis(self.latency_warn_threshold_ms)
    }

    #[must_use]
    pub const fn stats_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_cache_ttl_s)
    }

    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = BusConfig::default();
        assert_eq!(cfg.queue_capacity, 100);
        assert_eq!(cfg.critical_block_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.lock_timeout(), Duration::from_millis(100));
        assert_eq!(cfg.latency_warn_threshold(), Duration::from_millis(50));
        assert_eq!(cfg.stats_cache_ttl(), Duration::from_secs(60));
        assert_eq!(cfg.latency_sample_window, 100);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = BusConfig::from_json(r#"{"queue_capacity": 10, "lock_timeout_ms": 20}"#).unwrap();
        assert_eq!(cfg.queue_capacity, 10);
        assert_eq!(cfg.lock_timeout_ms, 20);
        assert_eq!(cfg.critical_block_timeout_ms, 1000);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = BusConfig::from_json(r#"{"queue_capacity": 0}"#).unwrap_err();
        assert_eq!(err, ValidationError::MustBePositive { field: "queue_capacity" });
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = BusConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig { .. }));
    }
}
