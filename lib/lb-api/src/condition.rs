//! Status conditions shared by every watched resource

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

/// A single observation of a resource's state, in the metav1.Condition shape
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    pub reason: String,

    #[serde(default)]
    pub message: String,

    /// RFC3339 timestamp of the last status flip
    #[serde(default)]
    pub last_transition_time: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Build a condition stamped with the current time
    pub fn new(
        type_: &str,
        status: bool,
        reason: &str,
        message: impl Into<String>,
        observed_generation: Option<i64>,
    ) -> Self {
        Self {
            type_: type_.to_string(),
            status: if status { STATUS_TRUE } else { STATUS_FALSE }.to_string(),
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            observed_generation,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == STATUS_TRUE
    }
}

/// Insert or replace a condition by type.
///
/// The previous transition time is kept when the status did not flip, so
/// repeated reconciliations do not churn `lastTransitionTime`.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status && !existing.last_transition_time.is_empty() {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_appends_new_type() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, Condition::new("Accepted", true, "Accepted", "", Some(1)));
        set_condition(&mut conditions, Condition::new("Programmed", false, "Pending", "", Some(1)));
        assert_eq!(conditions.len(), 2);
        assert!(find_condition(&conditions, "Accepted").unwrap().is_true());
    }

    #[test]
    fn test_set_condition_keeps_transition_time_when_status_unchanged() {
        let mut conditions = vec![Condition {
            last_transition_time: "2020-01-01T00:00:00Z".to_string(),
            ..Condition::new("Accepted", true, "Accepted", "", Some(1))
        }];
        set_condition(&mut conditions, Condition::new("Accepted", true, "Accepted", "again", Some(2)));

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, "2020-01-01T00:00:00Z");
        assert_eq!(conditions[0].message, "again");
        assert_eq!(conditions[0].observed_generation, Some(2));
    }

    #[test]
    fn test_set_condition_updates_transition_time_on_flip() {
        let mut conditions = vec![Condition {
            last_transition_time: "2020-01-01T00:00:00Z".to_string(),
            ..Condition::new("Accepted", true, "Accepted", "", Some(1))
        }];
        set_condition(&mut conditions, Condition::new("Accepted", false, "Invalid", "", Some(2)));
        assert_ne!(conditions[0].last_transition_time, "2020-01-01T00:00:00Z");
        assert!(!conditions[0].is_true());
    }
}
