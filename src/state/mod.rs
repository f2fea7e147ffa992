//! Shared monitoring state and its derived-statistics cache.
//!
//! Producers and readers use the store directly rather than going through the
//! queue. All access is bounded by the store's lock timeout.

/// TTL cache entries and keys.
pub mod cache;
/// The lock-protected store.
pub mod store;
/// Tooltip/status summary derived through the cache.
pub mod summary;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::ConnectionState;

pub use cache::StatKey;
pub use store::SharedStateStore;
pub use summary::StatusSummary;

/// Last known posture classification.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureState {
    #[default]
    Unknown,
    Good,
    Bad,
}

/// Process-wide monitoring status.
///
/// Readers always get an owned copy from
/// [`SharedStateStore::get_snapshot`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedState {
    pub monitoring_active: bool,
    pub connection_state: ConnectionState,
    pub posture_state: PostureState,
    pub last_alert_time: Option<DateTime<Utc>>,
    /// Length of the current bad-posture streak.
    pub bad_posture_secs: u64,
    pub alerts_today: u32,
    pub corrections_today: u32,
}

impl SharedState {
    /// Fields whose values differ between `self` and `other`.
    #[must_use]
    pub fn diff(&self, other: &Self) -> FieldSet {
        let mut changed = FieldSet::EMPTY;
        if self.monitoring_active != other.monitoring_active {
            changed = changed.with(StateField::MonitoringActive);
        }
        if self.connection_state != other.connection_state {
            changed = changed.with(StateField::ConnectionState);
        }
        if self.posture_state != other.posture_state {
            changed = changed.with(StateField::PostureState);
        }
        if self.last_alert_time != other.last_alert_time {
            changed = changed.with(StateField::LastAlertTime);
        }
        if self.bad_posture_secs != other.bad_posture_secs {
            changed = changed.with(StateField::BadPostureSecs);
        }
        if self.alerts_today != other.alerts_today {
            changed = changed.with(StateField::AlertsToday);
        }
        if self.corrections_today != other.corrections_today {
            changed = changed.with(StateField::CorrectionsToday);
        }
        changed
    }
}

/// Names one field of [`SharedState`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    MonitoringActive,
    ConnectionState,
    PostureState,
    LastAlertTime,
    BadPostureSecs,
    AlertsToday,
    CorrectionsToday,
}

impl StateField {
    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Small bit set of [`StateField`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FieldSet(u8);

impl FieldSet {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(0b0111_1111);

    #[must_use]
    pub fn of(fields: &[StateField]) -> Self {
        fields.iter().fold(Self::EMPTY, |set, f| set.with(*f))
    }

    #[must_use]
    pub const fn with(self, field: StateField) -> Self {
        Self(self.0 | field.bit())
    }

    #[must_use]
    pub const fn contains(self, field: StateField) -> bool {
        self.0 & field.bit() != 0
    }

    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_reports_changed_fields_only() {
        let before = SharedState::default();
        let mut after = before.clone();
        after.alerts_today = 1;
        after.posture_state = PostureState::Bad;

        let changed = before.diff(&after);
        assert!(changed.contains(StateField::AlertsToday));
        assert!(changed.contains(StateField::PostureState));
        assert!(!changed.contains(StateField::MonitoringActive));
        assert!(before.diff(&before).is_empty());
    }

    #[test]
    fn field_set_intersection() {
        let alerts = FieldSet::of(&[StateField::AlertsToday, StateField::LastAlertTime]);
        assert!(alerts.intersects(FieldSet::of(&[StateField::LastAlertTime])));
        assert!(!alerts.intersects(FieldSet::of(&[StateField::ConnectionState])));
        assert!(FieldSet::ALL.contains(StateField::CorrectionsToday));
        assert!(!FieldSet::EMPTY.intersects(FieldSet::ALL));
    }
}
