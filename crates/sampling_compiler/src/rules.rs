//! Rule types of the global sampling engine and their wire format.
//!
//! The compiled document is
//! `{"global_rules":[...],"service_rules":[...],"endpoint_rules":[...]}`
//! with every rule encoded as `{"name","type","rule_details"}`. Encoding and
//! decoding go through an explicit table keyed by the `type` discriminator.

use sampling_actions::sampler::{
    validate_ratio, BooleanOperation, JsonOperation, NumberOperation, StringOperation,
};
use sampling_actions::{TypedCondition, ValidationError};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Bucket a rule is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleScope {
    /// Applies to every trace.
    Global,
    /// Applies to one service.
    Service,
    /// Applies to one endpoint of a service.
    Endpoint,
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Service => write!(f, "service"),
            Self::Endpoint => write!(f, "endpoint"),
        }
    }
}

/// Rule type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
    /// Error-based rule.
    Error,
    /// Per-service ratio rule.
    ServiceName,
    /// Endpoint latency rule.
    Latency,
    /// Span attribute predicate rule.
    SpanAttribute,
}

impl RuleType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::ServiceName => "service_name",
            Self::Latency => "latency",
            Self::SpanAttribute => "span_attribute",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "error" => Some(Self::Error),
            "service_name" => Some(Self::ServiceName),
            "latency" => Some(Self::Latency),
            "span_attribute" => Some(Self::SpanAttribute),
            _ => None,
        }
    }
}

/// Keep every trace with an error; keep a share of the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRule {
    /// Percentage of error-free traces to keep.
    pub fallback_sampling_ratio: f64,
}

/// Keep a share of one service's traces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceNameRule {
    /// Service name.
    pub service_name: String,
    /// Percentage of the service's traces to keep.
    pub sampling_ratio: f64,
    /// Percentage of other traces to keep.
    pub fallback_sampling_ratio: f64,
}

/// Keep slow requests on one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyRule {
    /// Service name.
    pub service_name: String,
    /// HTTP route.
    pub http_route: String,
    /// Threshold in milliseconds.
    pub threshold: i64,
    /// Percentage of faster traces to keep.
    pub fallback_sampling_ratio: f64,
}

/// Keep traces whose spans match an attribute predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanAttributeRule {
    /// Service name.
    pub service_name: String,
    /// Attribute key.
    pub attribute_key: String,
    /// Typed predicate.
    pub condition: TypedCondition,
    /// Percentage of matching traces to keep.
    pub sampling_ratio: f64,
    /// Percentage of non-matching traces to keep.
    pub fallback_sampling_ratio: f64,
}

/// Payload of a rule, one variant per rule type.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleDetails {
    /// `error`.
    Error(ErrorRule),
    /// `service_name`.
    ServiceName(ServiceNameRule),
    /// `latency`.
    Latency(LatencyRule),
    /// `span_attribute`.
    SpanAttribute(SpanAttributeRule),
}

type Validation = std::result::Result<(), ValidationError>;

fn require(field: &'static str, value: &str) -> Validation {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

impl RuleDetails {
    /// Type discriminator.
    #[must_use]
    pub const fn rule_type(&self) -> RuleType {
        match self {
            Self::Error(_) => RuleType::Error,
            Self::ServiceName(_) => RuleType::ServiceName,
            Self::Latency(_) => RuleType::Latency,
            Self::SpanAttribute(_) => RuleType::SpanAttribute,
        }
    }

    /// Validates the payload.
    ///
    /// # Errors
    ///
    /// Returns an error for ratios outside `[0, 100]` or empty identifiers.
    pub fn validate(&self) -> Validation {
        match self {
            Self::Error(r) => validate_ratio("fallback_sampling_ratio", r.fallback_sampling_ratio),
            Self::ServiceName(r) => {
                require("service_name", &r.service_name)?;
                validate_ratio("sampling_ratio", r.sampling_ratio)?;
                validate_ratio("fallback_sampling_ratio", r.fallback_sampling_ratio)
            }
            Self::Latency(r) => {
                require("service_name", &r.service_name)?;
                require("http_route", &r.http_route)?;
                if r.threshold < 0 {
                    return Err(ValidationError::Invalid(format!(
                        "threshold must not be negative, got {}",
                        r.threshold
                    )));
                }
                validate_ratio("fallback_sampling_ratio", r.fallback_sampling_ratio)
            }
            Self::SpanAttribute(r) => {
                require("service_name", &r.service_name)?;
                require("attribute_key", &r.attribute_key)?;
                validate_ratio("sampling_ratio", r.sampling_ratio)?;
                validate_ratio("fallback_sampling_ratio", r.fallback_sampling_ratio)
            }
        }
    }
}

/// A named rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Deterministic rule name.
    pub name: String,
    /// Payload.
    pub details: RuleDetails,
}

impl Rule {
    /// Creates a rule.
    #[must_use]
    pub fn new(name: impl Into<String>, details: RuleDetails) -> Self {
        Self {
            name: name.into(),
            details,
        }
    }

    /// Type discriminator.
    #[must_use]
    pub const fn rule_type(&self) -> RuleType {
        self.details.rule_type()
    }
}

/// Separator between the resource name and each discriminator. Resource
/// names cannot contain it, so rules of different resources never share a
/// prefix.
pub const RULE_NAME_SEPARATOR: char = '/';

/// Derives a rule name from the owning resource and its discriminating fields.
#[must_use]
pub fn rule_name(source: &str, discriminators: &[&str]) -> String {
    let mut name = source.to_string();
    for part in discriminators {
        name.push(RULE_NAME_SEPARATOR);
        name.push_str(part);
    }
    name
}

/// Serialized form of the global sampling processor's configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingRulesConfig {
    /// Rules evaluated for every trace.
    pub global_rules: Vec<Rule>,
    /// Per-service rules.
    pub service_rules: Vec<Rule>,
    /// Per-endpoint rules.
    pub endpoint_rules: Vec<Rule>,
}

impl SamplingRulesConfig {
    /// Adds a rule to the bucket for `scope`.
    pub fn push(&mut self, scope: RuleScope, rule: Rule) {
        self.bucket_mut(scope).push(rule);
    }

    /// Rules in the bucket for `scope`.
    #[must_use]
    pub fn bucket(&self, scope: RuleScope) -> &[Rule] {
        match scope {
            RuleScope::Global => &self.global_rules,
            RuleScope::Service => &self.service_rules,
            RuleScope::Endpoint => &self.endpoint_rules,
        }
    }

    fn bucket_mut(&mut self, scope: RuleScope) -> &mut Vec<Rule> {
        match scope {
            RuleScope::Global => &mut self.global_rules,
            RuleScope::Service => &mut self.service_rules,
            RuleScope::Endpoint => &mut self.endpoint_rules,
        }
    }

    /// Sorts every bucket by rule name. Sorting is stable.
    pub fn sort(&mut self) {
        for scope in [RuleScope::Global, RuleScope::Service, RuleScope::Endpoint] {
            self.bucket_mut(scope).sort_by(|a, b| a.name.cmp(&b.name));
        }
    }

    /// Suffixes repeated rule names with `#2`, `#3`, ... so that every name
    /// is unique across the buckets. The first occurrence keeps its name.
    pub fn dedupe_names(&mut self) {
        let mut taken = BTreeSet::new();
        for scope in [RuleScope::Global, RuleScope::Service, RuleScope::Endpoint] {
            for rule in self.bucket_mut(scope) {
                if taken.insert(rule.name.clone()) {
                    continue;
                }
                let mut n = 2;
                let mut candidate = format!("{}#{n}", rule.name);
                while taken.contains(&candidate) {
                    n += 1;
                    candidate = format!("{}#{n}", rule.name);
                }
                taken.insert(candidate.clone());
                rule.name = candidate;
            }
        }
    }

    /// Total number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.global_rules.len() + self.service_rules.len() + self.endpoint_rules.len()
    }

    /// Returns true if every bucket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Rule", 3)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("type", self.rule_type().as_str())?;
        match &self.details {
            RuleDetails::Error(d) => state.serialize_field("rule_details", d)?,
            RuleDetails::ServiceName(d) => state.serialize_field("rule_details", d)?,
            RuleDetails::Latency(d) => state.serialize_field("rule_details", d)?,
            RuleDetails::SpanAttribute(d) => state.serialize_field("rule_details", d)?,
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct RawRule {
    name: String,
    #[serde(rename = "type")]
    rule_type: String,
    rule_details: Value,
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawRule::deserialize(deserializer)?;
        let rule_type = RuleType::parse(&raw.rule_type)
            .ok_or_else(|| de::Error::custom(format!("unknown rule type '{}'", raw.rule_type)))?;
        let details = match rule_type {
            RuleType::Error => serde_json::from_value(raw.rule_details).map(RuleDetails::Error),
            RuleType::ServiceName => {
                serde_json::from_value(raw.rule_details).map(RuleDetails::ServiceName)
            }
            RuleType::Latency => serde_json::from_value(raw.rule_details).map(RuleDetails::Latency),
            RuleType::SpanAttribute => {
                serde_json::from_value(raw.rule_details).map(RuleDetails::SpanAttribute)
            }
        }
        .map_err(de::Error::custom)?;
        Ok(Self {
            name: raw.name,
            details,
        })
    }
}

// The attribute condition is encoded under a key equal to its own type:
// {"condition_type": "string", "string": {"operation": ..., "expected_value": ...}}
// with `json_path` kept beside the shared fields.

#[derive(Serialize)]
struct OperationBody<'a, T: Serialize> {
    operation: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_value: Option<&'a T>,
}

impl Serialize for SpanAttributeRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let condition_type = self.condition.condition_type();
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("service_name", &self.service_name)?;
        map.serialize_entry("attribute_key", &self.attribute_key)?;
        map.serialize_entry("condition_type", condition_type)?;
        match &self.condition {
            TypedCondition::String {
                operation,
                expected_value,
            } => map.serialize_entry(
                condition_type,
                &OperationBody {
                    operation: operation.as_str(),
                    expected_value: expected_value.as_ref(),
                },
            )?,
            TypedCondition::Number {
                operation,
                expected_value,
            } => map.serialize_entry(
                condition_type,
                &OperationBody {
                    operation: operation.as_str(),
                    expected_value: expected_value.as_ref(),
                },
            )?,
            TypedCondition::Boolean {
                operation,
                expected_value,
            } => map.serialize_entry(
                condition_type,
                &OperationBody {
                    operation: operation.as_str(),
                    expected_value: expected_value.as_ref(),
                },
            )?,
            TypedCondition::Json {
                operation,
                expected_value,
                json_path,
            } => {
                map.serialize_entry(
                    condition_type,
                    &OperationBody {
                        operation: operation.as_str(),
                        expected_value: expected_value.as_ref(),
                    },
                )?;
                if let Some(path) = json_path {
                    map.serialize_entry("json_path", path)?;
                }
            }
        }
        map.serialize_entry("sampling_ratio", &self.sampling_ratio)?;
        map.serialize_entry("fallback_sampling_ratio", &self.fallback_sampling_ratio)?;
        map.end()
    }
}

fn take<T: de::DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Result<T, String> {
    let value = map
        .remove(key)
        .ok_or_else(|| format!("missing field '{key}'"))?;
    serde_json::from_value(value).map_err(|e| format!("{key}: {e}"))
}

fn take_opt<T: de::DeserializeOwned>(
    map: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<T>, String> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| format!("{key}: {e}")),
    }
}

fn operation<T>(
    parse: fn(&str) -> Option<T>,
    condition_type: &str,
    body: &mut Map<String, Value>,
) -> Result<T, String> {
    let name: String = take(body, "operation")?;
    parse(&name).ok_or_else(|| format!("unsupported {condition_type} operation '{name}'"))
}

impl SpanAttributeRule {
    fn from_map(mut map: Map<String, Value>) -> Result<Self, String> {
        let condition_type: String = take(&mut map, "condition_type")?;
        let mut body: Map<String, Value> = take(&mut map, &condition_type)?;

        let condition = match condition_type.as_str() {
            "string" => TypedCondition::String {
                operation: operation(StringOperation::parse, "string", &mut body)?,
                expected_value: take_opt(&mut body, "expected_value")?,
            },
            "number" => TypedCondition::Number {
                operation: operation(NumberOperation::parse, "number", &mut body)?,
                expected_value: take_opt(&mut body, "expected_value")?,
            },
            "boolean" => TypedCondition::Boolean {
                operation: operation(BooleanOperation::parse, "boolean", &mut body)?,
                expected_value: take_opt(&mut body, "expected_value")?,
            },
            "json" => TypedCondition::Json {
                operation: operation(JsonOperation::parse, "json", &mut body)?,
                expected_value: take_opt(&mut body, "expected_value")?,
                json_path: take_opt(&mut map, "json_path")?,
            },
            other => return Err(format!("unknown condition type '{other}'")),
        };

        Ok(Self {
            service_name: take(&mut map, "service_name")?,
            attribute_key: take(&mut map, "attribute_key")?,
            condition,
            sampling_ratio: take(&mut map, "sampling_ratio")?,
            fallback_sampling_ratio: take(&mut map, "fallback_sampling_ratio")?,
        })
    }
}

impl<'de> Deserialize<'de> for SpanAttributeRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_map(map).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_rule(condition: TypedCondition) -> Rule {
        Rule::new(
            "attrs/checkout/user.tier",
            RuleDetails::SpanAttribute(SpanAttributeRule {
                service_name: "checkout".to_string(),
                attribute_key: "user.tier".to_string(),
                condition,
                sampling_ratio: 100.0,
                fallback_sampling_ratio: 5.0,
            }),
        )
    }

    #[test]
    fn rule_serializes_name_type_and_details() {
        let rule = Rule::new(
            "errors",
            RuleDetails::Error(ErrorRule {
                fallback_sampling_ratio: 10.0,
            }),
        );
        insta::assert_snapshot!(
            serde_json::to_string(&rule).unwrap(),
            @r#"{"name":"errors","type":"error","rule_details":{"fallback_sampling_ratio":10.0}}"#
        );
    }

    #[test]
    fn string_condition_is_keyed_by_its_type() {
        let rule = span_rule(TypedCondition::String {
            operation: StringOperation::Equals,
            expected_value: Some("gold".to_string()),
        });
        insta::assert_snapshot!(
            serde_json::to_string(&rule).unwrap(),
            @r#"{"name":"attrs/checkout/user.tier","type":"span_attribute","rule_details":{"service_name":"checkout","attribute_key":"user.tier","condition_type":"string","string":{"operation":"equals","expected_value":"gold"},"sampling_ratio":100.0,"fallback_sampling_ratio":5.0}}"#
        );
    }

    #[test]
    fn json_condition_keeps_json_path_beside_shared_fields() {
        let rule = span_rule(TypedCondition::Json {
            operation: JsonOperation::JsonPathExists,
            expected_value: None,
            json_path: Some("$.user.id".to_string()),
        });
        let value = serde_json::to_value(&rule).unwrap();
        let details = &value["rule_details"];
        assert_eq!(details["condition_type"], "json");
        assert_eq!(details["json"]["operation"], "jsonpath_exists");
        assert!(details["json"].get("expected_value").is_none());
        assert_eq!(details["json_path"], "$.user.id");
    }

    #[test]
    fn rules_decode_by_type() {
        for rule in [
            span_rule(TypedCondition::Number {
                operation: NumberOperation::GreaterThan,
                expected_value: Some(3.5),
            }),
            span_rule(TypedCondition::Boolean {
                operation: BooleanOperation::Exists,
                expected_value: None,
            }),
            Rule::new(
                "slow/frontend//cart",
                RuleDetails::Latency(LatencyRule {
                    service_name: "frontend".to_string(),
                    http_route: "/cart".to_string(),
                    threshold: 750,
                    fallback_sampling_ratio: 1.0,
                }),
            ),
        ] {
            let json = serde_json::to_string(&rule).unwrap();
            let decoded: Rule = serde_json::from_str(&json).unwrap();
            assert_eq!(decoded, rule);
        }
    }

    #[test]
    fn unknown_rule_type_fails_to_decode() {
        let json = r#"{"name":"x","type":"tail","rule_details":{}}"#;
        let err = serde_json::from_str::<Rule>(json).unwrap_err();
        assert!(err.to_string().contains("unknown rule type 'tail'"));
    }

    #[test]
    fn config_keeps_bucket_order_on_the_wire() {
        let config = SamplingRulesConfig::default();
        assert_eq!(
            serde_json::to_string(&config).unwrap(),
            r#"{"global_rules":[],"service_rules":[],"endpoint_rules":[]}"#
        );
    }

    #[test]
    fn sort_orders_each_bucket_by_name() {
        let mut config = SamplingRulesConfig::default();
        for name in ["c", "a", "b"] {
            config.push(
                RuleScope::Global,
                Rule::new(
                    name,
                    RuleDetails::Error(ErrorRule {
                        fallback_sampling_ratio: 1.0,
                    }),
                ),
            );
        }
        config.sort();
        let names: Vec<_> = config.global_rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn details_validation() {
        let bad = RuleDetails::ServiceName(ServiceNameRule {
            service_name: String::new(),
            sampling_ratio: 10.0,
            fallback_sampling_ratio: 1.0,
        });
        assert_eq!(bad.validate(), Err(ValidationError::MissingField("service_name")));

        let over = RuleDetails::Error(ErrorRule {
            fallback_sampling_ratio: 150.0,
        });
        assert!(over.validate().is_err());
    }

    #[test]
    fn rule_name_joins_discriminators() {
        assert_eq!(rule_name("cart-ratio", &["cart"]), "cart-ratio/cart");
        assert_eq!(rule_name("errors", &[]), "errors");
        assert_ne!(rule_name("a", &["b-c"]), rule_name("a-b", &["c"]));
    }

    #[test]
    fn repeated_names_get_a_suffix() {
        let error = |name: &str| {
            Rule::new(
                name,
                RuleDetails::Error(ErrorRule {
                    fallback_sampling_ratio: 1.0,
                }),
            )
        };
        let mut config = SamplingRulesConfig::default();
        config.push(RuleScope::Global, error("a"));
        config.push(RuleScope::Service, error("a/x"));
        config.push(RuleScope::Service, error("a/x"));
        config.push(RuleScope::Service, error("a/x#2"));
        config.dedupe_names();

        let names: Vec<_> = config
            .global_rules
            .iter()
            .chain(&config.service_rules)
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "a/x", "a/x#2", "a/x#2#2"]);
    }
}
