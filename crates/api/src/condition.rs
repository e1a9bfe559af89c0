//! Status conditions: an ordered set keyed by condition type.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Condition type reporting overall readiness.
pub const READY: &str = "Ready";

/// Reason used while a dependent resource has not reported readiness.
pub const PROGRESSING_REASON: &str = "Progressing";

/// Reason used while upstream chart data is still being resolved.
pub const DEPENDENCY_NOT_READY_REASON: &str = "DependencyNotReady";

/// Reason used when an invocation aborted with an error.
pub const RECONCILIATION_FAILED_REASON: &str = "ReconciliationFailed";

/// Tri-state condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A single observation about an object's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a condition stamped with the current time.
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
            observed_generation: None,
        }
    }

    #[must_use]
    pub const fn with_observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Capability to read and replace an object's condition set.
pub trait HasConditions {
    fn conditions(&self) -> &[Condition];
    fn set_conditions(&mut self, conditions: Vec<Condition>);
}

/// Look up a condition by type.
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Insert or update a condition, keeping set order and uniqueness by type.
///
/// The transition time only moves when the status actually changes.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_set_condition_appends_new_type() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            Condition::new(READY, ConditionStatus::False, PROGRESSING_REASON, "wait"),
        );
        set_condition(
            &mut conditions,
            Condition::new("Stalled", ConditionStatus::False, "None", ""),
        );
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions.first().map(|c| c.type_.as_str()), Some(READY));
    }

    #[test]
    fn test_set_condition_keeps_transition_time_when_status_unchanged() {
        let mut first = Condition::new(READY, ConditionStatus::False, PROGRESSING_REASON, "a");
        first.last_transition_time -= Duration::hours(1);
        let original_time = first.last_transition_time;
        let mut conditions = vec![first];

        set_condition(
            &mut conditions,
            Condition::new(READY, ConditionStatus::False, "Other", "b"),
        );

        let ready = find_condition(&conditions, READY);
        assert_eq!(ready.map(|c| c.last_transition_time), Some(original_time));
        assert_eq!(ready.map(|c| c.reason.as_str()), Some("Other"));
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_set_condition_moves_transition_time_on_status_change() {
        let mut first = Condition::new(READY, ConditionStatus::False, PROGRESSING_REASON, "a");
        first.last_transition_time -= Duration::hours(1);
        let original_time = first.last_transition_time;
        let mut conditions = vec![first];

        set_condition(
            &mut conditions,
            Condition::new(READY, ConditionStatus::True, "Succeeded", "done"),
        );

        let ready = find_condition(&conditions, READY);
        assert!(ready.is_some_and(|c| c.last_transition_time > original_time));
        assert!(ready.is_some_and(Condition::is_true));
    }
}
