use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::ConnectionState;

use super::cache::StatKey;
use super::{FieldSet, PostureState, SharedState, StateField};

/// Status line shown by the tray tooltip, derived from [`SharedState`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub monitoring_active: bool,
    pub posture_state: PostureState,
    pub connection_state: ConnectionState,
    pub alerts_today: u32,
    pub corrections_today: u32,
    pub last_alert_time: Option<DateTime<Utc>>,
    pub tooltip: String,
}

impl StatusSummary {
    /// Cache key; every field the summary reads is a dependency.
    pub const KEY: StatKey = StatKey::new(
        "status_summary",
        FieldSet::EMPTY
            .with(StateField::MonitoringActive)
            .with(StateField::PostureState)
            .with(StateField::ConnectionState)
            .with(StateField::AlertsToday)
            .with(StateField::CorrectionsToday)
            .with(StateField::LastAlertTime),
    );

    #[must_use]
    pub fn from_state(state: &SharedState) -> Self {
        let monitoring = if state.monitoring_active { "Monitoring" } else { "Paused" };
        let posture = match state.posture_state {
            PostureState::Unknown => "Unknown",
            PostureState::Good => "Good",
            PostureState::Bad => "Bad",
        };
        let mut tooltip = format!(
            "{monitoring} | Posture: {posture} | Alerts today: {}",
            state.alerts_today
        );
        if state.connection_state != ConnectionState::Connected {
            tooltip.push_str(" | Offline");
        }

        Self {
            monitoring_active: state.monitoring_active,
            posture_state: state.posture_state,
            connection_state: state.connection_state,
            alerts_today: state.alerts_today,
            corrections_today: state.corrections_today,
            last_alert_time: state.last_alert_time,
            tooltip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tooltip_reflects_state() {
        let state = SharedState {
            monitoring_active: true,
            connection_state: ConnectionState::Connected,
            posture_state: PostureState::Bad,
            alerts_today: 3,
            ..SharedState::default()
        };
        let summary = StatusSummary::from_state(&state);
        assert_eq!(summary.tooltip, "Monitoring | Posture: Bad | Alerts today: 3");
    }

    #[test]
    fn offline_is_flagged() {
        let summary = StatusSummary::from_state(&SharedState::default());
        assert_eq!(summary.tooltip, "Paused | Posture: Unknown | Alerts today: 0 | Offline");
    }

    #[test]
    fn streak_length_is_not_a_dependency() {
        assert!(!StatusSummary::KEY.depends_on().contains(StateField::BadPostureSecs));
    }
}
