//! Policy types of the tail-sampling engine and their wire format.
//!
//! A policy is encoded as `{"name","type","<type>":{...}}`: the payload sits
//! under a key equal to the `type` string, so decoding reads `type` first and
//! then the sibling with that name.

use sampling_actions::sampler::validate_ratio;
use sampling_actions::ValidationError;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Policy type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PolicyType {
    /// Keep traces slower than a threshold.
    Latency,
    /// Keep a fixed share of traces.
    Probabilistic,
}

impl PolicyType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Latency => "latency",
            Self::Probabilistic => "probabilistic",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "latency" => Some(Self::Latency),
            "probabilistic" => Some(Self::Probabilistic),
            _ => None,
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latency policy payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyPolicy {
    /// Minimum trace duration to keep, in milliseconds.
    pub threshold_ms: i64,
}

/// Probabilistic policy payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilisticPolicy {
    /// Percentage of traces to keep.
    pub sampling_percentage: f64,
}

/// Payload of a policy, one variant per policy type.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyDetails {
    /// `latency`.
    Latency(LatencyPolicy),
    /// `probabilistic`.
    Probabilistic(ProbabilisticPolicy),
}

impl PolicyDetails {
    /// Type discriminator.
    #[must_use]
    pub const fn policy_type(&self) -> PolicyType {
        match self {
            Self::Latency(_) => PolicyType::Latency,
            Self::Probabilistic(_) => PolicyType::Probabilistic,
        }
    }

    /// Validates the payload.
    ///
    /// # Errors
    ///
    /// Returns an error for a negative threshold or a percentage outside `[0, 100]`.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        match self {
            Self::Latency(p) if p.threshold_ms < 0 => Err(ValidationError::Invalid(format!(
                "threshold_ms must not be negative, got {}",
                p.threshold_ms
            ))),
            Self::Latency(_) => Ok(()),
            Self::Probabilistic(p) => validate_ratio("sampling_percentage", p.sampling_percentage),
        }
    }

    /// Value compared when choosing between policies of the same type.
    /// Lower is preferred.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn selection_key(&self) -> f64 {
        match self {
            Self::Latency(p) => p.threshold_ms as f64,
            Self::Probabilistic(p) => p.sampling_percentage,
        }
    }
}

/// A named tail-sampling policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    /// Policy name, `<type>-<resource name>`.
    pub name: String,
    /// Payload.
    pub details: PolicyDetails,
}

impl Policy {
    /// Creates a policy named after its type and source resource.
    #[must_use]
    pub fn for_source(source: &str, details: PolicyDetails) -> Self {
        Self {
            name: format!("{}-{}", details.policy_type(), source),
            details,
        }
    }

    /// Type discriminator.
    #[must_use]
    pub const fn policy_type(&self) -> PolicyType {
        self.details.policy_type()
    }
}

impl Serialize for Policy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let policy_type = self.policy_type().as_str();
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("type", policy_type)?;
        match &self.details {
            PolicyDetails::Latency(d) => map.serialize_entry(policy_type, d)?,
            PolicyDetails::Probabilistic(d) => map.serialize_entry(policy_type, d)?,
        }
        map.end()
    }
}

impl Policy {
    fn from_map(mut map: Map<String, Value>) -> Result<Self, String> {
        let name = match map.remove("name") {
            Some(Value::String(name)) => name,
            _ => return Err("missing field 'name'".to_string()),
        };
        let type_name = match map.remove("type") {
            Some(Value::String(t)) => t,
            _ => return Err("missing field 'type'".to_string()),
        };
        let policy_type =
            PolicyType::parse(&type_name).ok_or_else(|| format!("unknown policy type '{type_name}'"))?;
        let body = map
            .remove(policy_type.as_str())
            .ok_or_else(|| format!("missing '{type_name}' payload"))?;

        let details = match policy_type {
            PolicyType::Latency => serde_json::from_value(body).map(PolicyDetails::Latency),
            PolicyType::Probabilistic => {
                serde_json::from_value(body).map(PolicyDetails::Probabilistic)
            }
        }
        .map_err(|e| format!("{type_name}: {e}"))?;

        Ok(Self { name, details })
    }
}

impl<'de> Deserialize<'de> for Policy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_map(map).map_err(de::Error::custom)
    }
}

/// Configuration of the `tail_sampling` processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TailSamplingConfig {
    /// One winning policy per type, ordered by type.
    pub policies: Vec<Policy>,
}

/// Configuration of the `probabilistic_sampler` processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilisticSamplerSettings {
    /// Percentage of traces to keep.
    pub sampling_percentage: f64,
}
