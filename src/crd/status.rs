//! # Managed Resource Status
//!
//! Condition types shared by every managed resource kind.
//!
//! Only the latest condition per type is kept. Setting a condition of an existing
//! type overwrites it, but `lastTransitionTime` only moves when the status flips.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ConditionType {
    /// The external resource is usable
    Ready,
    /// The last reconciliation pass completed without error
    Synced,
}

/// Condition status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Machine-readable reason codes surfaced on conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ConditionReason {
    /// External resource reports itself ready
    Available,
    /// External resource exists but is not ready
    Unavailable,
    /// External resource was just created
    Creating,
    /// External resource is being deleted
    Deleting,
    /// Reconciliation pass succeeded
    ReconcileSuccess,
    /// Could not build a client for the external API
    ConnectError,
    /// Could not observe the external resource
    ObserveError,
    /// Could not create the external resource
    CreateError,
    /// Could not update the external resource
    UpdateError,
    /// Could not delete the external resource
    DeleteError,
    /// Could not write connection details
    PublishConnectionError,
    /// Could not read or write the managed resource itself
    ReconcileError,
}

impl ConditionReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Unavailable => "Unavailable",
            Self::Creating => "Creating",
            Self::Deleting => "Deleting",
            Self::ReconcileSuccess => "ReconcileSuccess",
            Self::ConnectError => "ConnectError",
            Self::ObserveError => "ObserveError",
            Self::CreateError => "CreateError",
            Self::UpdateError => "UpdateError",
            Self::DeleteError => "DeleteError",
            Self::PublishConnectionError => "PublishConnectionError",
            Self::ReconcileError => "ReconcileError",
        }
    }
}

impl fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: ConditionType,
    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Reason for the condition
    pub reason: ConditionReason,
    /// Message describing the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Last transition time (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    fn new(
        r#type: ConditionType,
        status: ConditionStatus,
        reason: ConditionReason,
        message: Option<String>,
    ) -> Self {
        Self {
            r#type,
            status,
            reason,
            message,
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// Ready=True: the external resource reports itself usable
    pub fn available() -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::True,
            ConditionReason::Available,
            None,
        )
    }

    /// Ready=False: the external resource exists but is not usable yet
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::False,
            ConditionReason::Unavailable,
            Some(message.into()),
        )
    }

    pub fn creating() -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::False,
            ConditionReason::Creating,
            None,
        )
    }

    pub fn deleting() -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::False,
            ConditionReason::Deleting,
            None,
        )
    }

    /// Synced=True
    pub fn reconcile_success() -> Self {
        Self::new(
            ConditionType::Synced,
            ConditionStatus::True,
            ConditionReason::ReconcileSuccess,
            None,
        )
    }

    /// Synced=False with the failure reason and message
    pub fn reconcile_error(reason: ConditionReason, message: impl Into<String>) -> Self {
        Self::new(
            ConditionType::Synced,
            ConditionStatus::False,
            reason,
            Some(message.into()),
        )
    }

    /// Same observable content, ignoring the transition time
    fn equivalent(&self, other: &Self) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Status fields common to every managed resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ResourceStatus {
    /// Get the condition of the given type, if any
    pub fn condition(&self, r#type: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == r#type)
    }

    /// Set (replace by type) a condition
    ///
    /// The previous transition time is kept when the status did not change.
    /// Returns true if the stored condition changed in any observable way.
    pub fn set_condition(&mut self, mut condition: Condition) -> bool {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            Some(existing) => {
                if existing.equivalent(&condition) {
                    return false;
                }
                if existing.status == condition.status {
                    condition
                        .last_transition_time
                        .clone_from(&existing.last_transition_time);
                }
                *existing = condition;
                true
            }
            None => {
                self.conditions.push(condition);
                true
            }
        }
    }

    pub fn is_true(&self, r#type: ConditionType) -> bool {
        self.condition(r#type)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }
}

/// Status of a managed resource: conditions plus the last observed external state
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedStatus<O> {
    #[serde(flatten)]
    pub resource: ResourceStatus,
    /// Last observed external state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<O>,
}

impl<O> Default for ManagedStatus<O> {
    fn default() -> Self {
        Self {
            resource: ResourceStatus::default(),
            at_provider: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_appends_new_type() {
        let mut status = ResourceStatus::default();
        assert!(status.set_condition(Condition::reconcile_success()));
        assert!(status.set_condition(Condition::creating()));
        assert_eq!(status.conditions.len(), 2);
        assert!(status.is_true(ConditionType::Synced));
        assert!(!status.is_true(ConditionType::Ready));
    }

    #[test]
    fn test_set_condition_keeps_transition_time_when_status_unchanged() {
        let mut status = ResourceStatus::default();
        let mut first = Condition::reconcile_error(ConditionReason::ObserveError, "boom");
        first.last_transition_time = Some("2024-01-01T00:00:00+00:00".to_string());
        status.set_condition(first);

        // Same status, different reason and message
        assert!(status.set_condition(Condition::reconcile_error(
            ConditionReason::CreateError,
            "quota exceeded"
        )));

        let synced = status.condition(ConditionType::Synced).unwrap();
        assert_eq!(synced.reason, ConditionReason::CreateError);
        assert_eq!(synced.message.as_deref(), Some("quota exceeded"));
        assert_eq!(
            synced.last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00+00:00")
        );
        assert_eq!(status.conditions.len(), 1);
    }

    #[test]
    fn test_set_condition_moves_transition_time_when_status_flips() {
        let mut status = ResourceStatus::default();
        let mut first = Condition::reconcile_error(ConditionReason::ObserveError, "boom");
        first.last_transition_time = Some("2024-01-01T00:00:00+00:00".to_string());
        status.set_condition(first);

        status.set_condition(Condition::reconcile_success());

        let synced = status.condition(ConditionType::Synced).unwrap();
        assert_eq!(synced.status, ConditionStatus::True);
        assert_ne!(
            synced.last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_set_identical_condition_is_not_a_change() {
        let mut status = ResourceStatus::default();
        status.set_condition(Condition::available());
        assert!(!status.set_condition(Condition::available()));
    }

    #[test]
    fn test_managed_status_flattens_conditions() {
        let mut status: ManagedStatus<String> = ManagedStatus::default();
        status.resource.set_condition(Condition::available());
        status.at_provider = Some("observed".to_string());
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["conditions"][0]["type"], "Ready");
        assert_eq!(value["atProvider"], "observed");
    }

    #[test]
    fn test_condition_serializes_with_kubernetes_field_names() {
        let condition = Condition::reconcile_error(ConditionReason::ConnectError, "no creds");
        let value = serde_json::to_value(&condition).unwrap();
        assert_eq!(value["type"], "Synced");
        assert_eq!(value["status"], "False");
        assert_eq!(value["reason"], "ConnectError");
        assert_eq!(value["message"], "no creds");
        assert!(value["lastTransitionTime"].is_string());
    }
}
