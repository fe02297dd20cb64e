//! Object metadata, owner references, signals, and status conditions.
//!
//! These mirror the Kubernetes shapes the control plane stores, reduced to
//! the fields the compiler reads or writes.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// API group/version of the unified `Action` kind.
pub const ACTION_API_VERSION: &str = "sampling.io/v1alpha1";

/// API group/version of the legacy single-purpose sampler kinds.
pub const LEGACY_API_VERSION: &str = "actions.sampling.io/v1alpha1";

/// Standard object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name, unique per kind within a namespace.
    pub name: String,
    /// Owning namespace.
    #[serde(default)]
    pub namespace: String,
    /// Store-assigned unique id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    /// Spec generation, bumped by the store on every spec change.
    #[serde(default)]
    pub generation: i64,
    /// Opaque version used by the store for optimistic concurrency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Owners of this object.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    /// Creates metadata for a named object in a namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            generation: 1,
            ..Self::default()
        }
    }

    /// Sets the unique id.
    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Reference from an owned object to one of its owners.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// API version of the owner.
    pub api_version: String,
    /// Kind of the owner.
    pub kind: String,
    /// Name of the owner.
    pub name: String,
    /// Unique id of the owner.
    pub uid: String,
}

/// Identifies one stored resource: kind, namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Resource kind.
    pub kind: String,
    /// Namespace.
    pub namespace: String,
    /// Name.
    pub name: String,
}

impl ObjectRef {
    /// Creates a new object reference.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Observability signal an action applies to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    /// Distributed traces.
    Traces,
    /// Metrics.
    Metrics,
    /// Logs.
    Logs,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Traces => write!(f, "TRACES"),
            Self::Metrics => write!(f, "METRICS"),
            Self::Logs => write!(f, "LOGS"),
        }
    }
}

/// Status of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// Not yet determined.
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

/// A Kubernetes-style status condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. `TransformedToProcessor`.
    #[serde(rename = "type")]
    pub type_: String,
    /// Whether the condition holds.
    pub status: ConditionStatus,
    /// Machine-readable reason code.
    pub reason: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Generation of the object this condition was computed from.
    #[serde(default)]
    pub observed_generation: i64,
    /// Last time `status` changed.
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Creates a condition stamped with the current time.
    #[must_use]
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        observed_generation: i64,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }

    /// Returns true if the condition holds.
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Object status carrying conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Status {
    /// Conditions, at most one per type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Status {
    /// Returns the condition of the given type, if set.
    #[must_use]
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Sets a condition, replacing any existing condition of the same type.
    ///
    /// The transition time of an existing condition is kept when its status
    /// does not change. Returns true if anything changed.
    pub fn set_condition(&mut self, mut condition: Condition) -> bool {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                if *existing == condition {
                    return false;
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn condition(status: ConditionStatus, reason: &str) -> Condition {
        Condition::new("TransformedToProcessor", status, reason, "", 1)
    }

    #[test]
    fn set_condition_keeps_transition_time_when_status_unchanged() {
        let mut status = Status::default();
        let mut first = condition(ConditionStatus::True, "ProcessorCreated");
        first.last_transition_time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(status.set_condition(first.clone()));

        let mut second = condition(ConditionStatus::True, "ProcessorCreated");
        second.message = "updated".to_string();
        assert!(status.set_condition(second));

        let stored = status.condition("TransformedToProcessor").unwrap();
        assert_eq!(stored.last_transition_time, first.last_transition_time);
        assert_eq!(stored.message, "updated");
    }

    #[test]
    fn set_condition_is_noop_for_identical_condition() {
        let mut status = Status::default();
        let c = condition(ConditionStatus::False, "InvalidConfig");
        assert!(status.set_condition(c.clone()));
        assert!(!status.set_condition(c));
        assert_eq!(status.conditions.len(), 1);
    }

    #[test]
    fn set_condition_moves_transition_time_on_status_change() {
        let mut status = Status::default();
        let mut first = condition(ConditionStatus::True, "ProcessorCreated");
        first.last_transition_time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        status.set_condition(first.clone());
        status.set_condition(condition(ConditionStatus::False, "InvalidConfig"));

        let stored = status.condition("TransformedToProcessor").unwrap();
        assert_ne!(stored.last_transition_time, first.last_transition_time);
        assert_eq!(stored.reason, "InvalidConfig");
    }

    #[test]
    fn signals_serialize_uppercase() {
        let json = serde_json::to_string(&vec![Signal::Traces, Signal::Logs]).unwrap();
        assert_eq!(json, r#"["TRACES","LOGS"]"#);
    }
}
