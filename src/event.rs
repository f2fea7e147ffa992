//! Event types carried by the bus.
//!
//! The set of event kinds is closed: producers and handlers match on
//! [`EventKind`] exhaustively, and handlers register against the payload-free
//! [`EventKindTag`].

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dequeue precedence of an event.
///
/// Ordered so that `Critical > Normal > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Normal,
    Critical,
}

impl Priority {
    /// All priorities, highest first.
    pub const DESCENDING: [Self; 3] = [Self::Critical, Self::Normal, Self::Low];

    /// Stable index used for per-priority arrays (`Critical = 0`).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Critical => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of the monitoring backend.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Bad posture has persisted for `duration_secs`.
    PostureAlert { duration_secs: u64 },
    /// Posture returned to good after `previous_duration_secs` of bad posture.
    PostureCorrected { previous_duration_secs: u64 },
    /// Backend connectivity changed.
    ConnectionStatus { state: ConnectionState },
    /// Monitoring was started or paused.
    MonitoringStatus { active: bool },
}

impl EventKind {
    #[must_use]
    pub const fn tag(&self) -> EventKindTag {
        match self {
            Self::PostureAlert { .. } => EventKindTag::PostureAlert,
            Self::PostureCorrected { .. } => EventKindTag::PostureCorrected,
            Self::ConnectionStatus { .. } => EventKindTag::ConnectionStatus,
            Self::MonitoringStatus { .. } => EventKindTag::MonitoringStatus,
        }
    }

    /// Priority used by [`Event::new`].
    ///
    /// Alerts are user-facing and latency bound; status changes can wait.
    #[must_use]
    pub const fn default_priority(&self) -> Priority {
        match self {
            Self::PostureAlert { .. } => Priority::Critical,
            Self::PostureCorrected { .. } | Self::ConnectionStatus { .. } => Priority::Normal,
            Self::MonitoringStatus { .. } => Priority::Low,
        }
    }
}

/// Payload-free discriminant of [`EventKind`], used as a registry key.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKindTag {
    PostureAlert,
    PostureCorrected,
    ConnectionStatus,
    MonitoringStatus,
}

impl EventKindTag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PostureAlert => "posture_alert",
            Self::PostureCorrected => "posture_corrected",
            Self::ConnectionStatus => "connection_status",
            Self::MonitoringStatus => "monitoring_status",
        }
    }
}

impl fmt::Display for EventKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single bus event.
///
/// `enqueue_time` and `sequence` are stamped by the queue when the event is
/// submitted; the event is read-only from then on.
#[derive(Debug, Clone)]
pub struct Event {
    priority: Priority,
    kind: EventKind,
    created_at: DateTime<Utc>,
    enqueue_time: Instant,
    sequence: u64,
}

impl Event {
    /// Creates an event with the kind's default priority.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self::with_priority(kind.default_priority(), kind)
    }

    #[must_use]
    pub fn with_priority(priority: Priority, kind: EventKind) -> Self {
        Self {
            priority,
            kind,
            created_at: Utc::now(),
            enqueue_time: Instant::now(),
            sequence: 0,
        }
    }

    pub(crate) fn stamp(&mut self, enqueue_time: Instant, sequence: u64) {
        self.enqueue_time = enqueue_time;
        self.sequence = sequence;
    }

    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub const fn kind(&self) -> &EventKind {
        &self.kind
    }

    #[must_use]
    pub const fn tag(&self) -> EventKindTag {
        self.kind.tag()
    }

    /// Wall-clock creation time, for logs and UI.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Monotonic submit time, used for latency measurement.
    #[must_use]
    pub const fn enqueue_time(&self) -> Instant {
        self.enqueue_time
    }

    /// Submit order; unique per queue.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Time spent since the event was submitted.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.enqueue_time.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_is_critical_first() {
        assert!(Priority::Critical > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        let idx: Vec<usize> = Priority::DESCENDING.iter().map(|p| p.index()).collect();
        assert_eq!(idx, vec![0, 1, 2]);
    }

    #[test]
    fn default_priorities() {
        assert_eq!(
            Event::new(EventKind::PostureAlert { duration_secs: 600 }).priority(),
            Priority::Critical
        );
        assert_eq!(
            Event::new(EventKind::PostureCorrected { previous_duration_secs: 30 }).priority(),
            Priority::Normal
        );
        assert_eq!(
            Event::new(EventKind::ConnectionStatus {
                state: ConnectionState::Connected,
            })
            .priority(),
            Priority::Normal
        );
        assert_eq!(
            Event::new(EventKind::MonitoringStatus { active: true }).priority(),
            Priority::Low
        );
    }

    #[test]
    fn kind_serializes_with_type_tag() {
        let kind = EventKind::ConnectionStatus { state: ConnectionState::Error };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "connection_status");
        assert_eq!(json["state"], "error");

        let back: EventKind = serde_json::from_value(json).unwrap();
        assert_eq!(back.tag(), EventKindTag::ConnectionStatus);
    }
}
