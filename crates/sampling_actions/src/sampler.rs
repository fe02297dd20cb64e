//! Sampler payload types and their validation contracts.
//!
//! Every sampler kind carries one payload type. Both the legacy
//! single-purpose resources and the unified `Action` embed the same payloads,
//! so validation lives here and is shared by both eras.

use crate::error::ValidationError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

type Validation = std::result::Result<(), ValidationError>;

/// The five sampler kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    /// Keep slow requests on selected endpoints.
    Latency,
    /// Keep traces that contain errors.
    Error,
    /// Keep a fixed percentage of traces.
    Probabilistic,
    /// Keep a ratio of traces per service.
    ServiceName,
    /// Keep traces whose spans match an attribute predicate.
    SpanAttribute,
}

impl SamplerKind {
    /// All kinds, in registry order.
    pub const ALL: [Self; 5] = [
        Self::Latency,
        Self::Error,
        Self::Probabilistic,
        Self::ServiceName,
        Self::SpanAttribute,
    ];

    /// Name of the legacy resource kind carrying this sampler.
    #[must_use]
    pub const fn legacy_kind(self) -> &'static str {
        match self {
            Self::Latency => "LatencySampler",
            Self::Error => "ErrorSampler",
            Self::Probabilistic => "ProbabilisticSampler",
            Self::ServiceName => "ServiceNameSampler",
            Self::SpanAttribute => "SpanAttributeSampler",
        }
    }

    /// Lowercase slug used in derived names.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Latency => "latencysampler",
            Self::Error => "errorsampler",
            Self::Probabilistic => "probabilisticsampler",
            Self::ServiceName => "servicenamesampler",
            Self::SpanAttribute => "spanattributesampler",
        }
    }

    /// Parses a legacy resource kind name.
    #[must_use]
    pub fn from_legacy_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.legacy_kind() == kind)
    }
}

impl fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.legacy_kind())
    }
}

/// Checks that a ratio or percentage lies in `[0, 100]`.
///
/// # Errors
///
/// Returns [`ValidationError::RatioOutOfRange`] for values outside the range,
/// including NaN.
pub fn validate_ratio(field: &'static str, value: f64) -> Validation {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::RatioOutOfRange {
            field,
            value: value.to_string(),
        })
    }
}

fn require(field: &'static str, value: &str) -> Validation {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

const fn full_ratio() -> f64 {
    100.0
}

/// Latency sampler: keep requests slower than a threshold on given endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LatencySamplerConfig {
    /// Endpoint filters.
    #[serde(default)]
    pub endpoints_filters: Vec<HttpRouteFilter>,
}

/// One endpoint filter of a latency sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HttpRouteFilter {
    /// HTTP route template, e.g. `/api/orders`.
    pub http_route: String,
    /// Service owning the route.
    pub service_name: String,
    /// Minimum latency in milliseconds for a trace to be kept.
    pub minimum_latency_threshold: i64,
    /// Percentage of faster traces to keep anyway.
    pub fallback_sampling_ratio: f64,
}

impl HttpRouteFilter {
    /// Validates the filter.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty service name, a route not starting with
    /// `/`, a negative threshold, or a ratio outside `[0, 100]`.
    pub fn validate(&self) -> Validation {
        require("service_name", &self.service_name)?;
        require("http_route", &self.http_route)?;
        if !self.http_route.starts_with('/') {
            return Err(ValidationError::Invalid(format!(
                "http_route '{}' must start with '/'",
                self.http_route
            )));
        }
        if self.minimum_latency_threshold < 0 {
            return Err(ValidationError::Invalid(format!(
                "minimum_latency_threshold must not be negative, got {}",
                self.minimum_latency_threshold
            )));
        }
        validate_ratio("fallback_sampling_ratio", self.fallback_sampling_ratio)
    }
}

impl LatencySamplerConfig {
    /// Validates all endpoint filters.
    ///
    /// # Errors
    ///
    /// Returns the first failing filter's error, or an error if there are no
    /// filters at all.
    pub fn validate(&self) -> Validation {
        if self.endpoints_filters.is_empty() {
            return Err(ValidationError::MissingField("endpoints_filters"));
        }
        self.endpoints_filters.iter().try_for_each(HttpRouteFilter::validate)
    }

    /// Lowest latency threshold across all filters.
    #[must_use]
    pub fn min_threshold(&self) -> Option<i64> {
        self.endpoints_filters
            .iter()
            .map(|f| f.minimum_latency_threshold)
            .min()
    }
}

/// Error sampler: keep every trace containing an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorSamplerConfig {
    /// Percentage of error-free traces to keep.
    pub fallback_sampling_ratio: f64,
}

impl ErrorSamplerConfig {
    /// Validates the ratio.
    ///
    /// # Errors
    ///
    /// Returns an error if the ratio is outside `[0, 100]`.
    pub fn validate(&self) -> Validation {
        validate_ratio("fallback_sampling_ratio", self.fallback_sampling_ratio)
    }
}

/// Probabilistic sampler: keep a fixed share of all traces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProbabilisticSamplerConfig {
    /// Percentage as written by the user, e.g. `"15"` or `"0.5"`.
    pub sampling_percentage: String,
}

impl ProbabilisticSamplerConfig {
    /// Parses the percentage.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a number in `[0, 100]`.
    pub fn percentage(&self) -> std::result::Result<f64, ValidationError> {
        require("sampling_percentage", &self.sampling_percentage)?;
        let value: f64 = self.sampling_percentage.trim().parse().map_err(|_| {
            ValidationError::Invalid(format!(
                "sampling_percentage '{}' is not a number",
                self.sampling_percentage
            ))
        })?;
        validate_ratio("sampling_percentage", value)?;
        Ok(value)
    }

    /// Validates the percentage.
    ///
    /// # Errors
    ///
    /// Same as [`Self::percentage`].
    pub fn validate(&self) -> Validation {
        self.percentage().map(|_| ())
    }
}

/// Service-name sampler: per-service sampling ratios.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ServiceNameSamplerConfig {
    /// Per-service filters.
    #[serde(default)]
    pub services_name_filters: Vec<ServiceNameFilter>,
}

/// One service filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ServiceNameFilter {
    /// Service name to match.
    pub service_name: String,
    /// Percentage of this service's traces to keep.
    pub sampling_ratio: f64,
    /// Percentage of other traces to keep.
    pub fallback_sampling_ratio: f64,
}

impl ServiceNameSamplerConfig {
    /// Validates every filter and checks service names are unique.
    ///
    /// # Errors
    ///
    /// Returns the first failing filter's error.
    pub fn validate(&self) -> Validation {
        if self.services_name_filters.is_empty() {
            return Err(ValidationError::MissingField("services_name_filters"));
        }
        let mut seen = BTreeSet::new();
        for filter in &self.services_name_filters {
            require("service_name", &filter.service_name)?;
            validate_ratio("sampling_ratio", filter.sampling_ratio)?;
            validate_ratio("fallback_sampling_ratio", filter.fallback_sampling_ratio)?;
            if !seen.insert(filter.service_name.as_str()) {
                return Err(ValidationError::Invalid(format!(
                    "service '{}' is listed more than once",
                    filter.service_name
                )));
            }
        }
        Ok(())
    }
}

/// Span-attribute sampler: keep traces whose spans match attribute predicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpanAttributeSamplerConfig {
    /// Attribute filters.
    #[serde(default)]
    pub attribute_filters: Vec<SpanAttributeFilter>,
}

/// One attribute predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpanAttributeFilter {
    /// Service whose spans are inspected.
    pub service_name: String,
    /// Span attribute key.
    pub attribute_key: String,
    /// Predicate on the attribute value.
    pub condition: AttributeCondition,
    /// Percentage of matching traces to keep.
    #[serde(default = "full_ratio")]
    pub sampling_ratio: f64,
    /// Percentage of non-matching traces to keep.
    pub fallback_sampling_ratio: f64,
}

impl SpanAttributeFilter {
    /// Validates the filter and resolves its condition.
    ///
    /// # Errors
    ///
    /// Returns an error for empty identifiers, ratios out of range, or an
    /// invalid condition.
    pub fn validate(&self) -> std::result::Result<TypedCondition, ValidationError> {
        require("service_name", &self.service_name)?;
        require("attribute_key", &self.attribute_key)?;
        validate_ratio("sampling_ratio", self.sampling_ratio)?;
        validate_ratio("fallback_sampling_ratio", self.fallback_sampling_ratio)?;
        self.condition.resolve()
    }
}

impl SpanAttributeSamplerConfig {
    /// Validates every filter.
    ///
    /// # Errors
    ///
    /// Returns the first failing filter's error.
    pub fn validate(&self) -> Validation {
        if self.attribute_filters.is_empty() {
            return Err(ValidationError::MissingField("attribute_filters"));
        }
        self.attribute_filters
            .iter()
            .try_for_each(|f| f.validate().map(|_| ()))
    }
}

/// Attribute condition as written: exactly one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AttributeCondition {
    /// String predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_condition: Option<StringCondition>,
    /// Number predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_condition: Option<NumberCondition>,
    /// Boolean predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean_condition: Option<BooleanCondition>,
    /// JSON predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_condition: Option<JsonCondition>,
}

/// Predicate on a string attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StringCondition {
    /// Operation name.
    pub operation: String,
    /// Value to compare against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<String>,
}

/// Predicate on a numeric attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NumberCondition {
    /// Operation name.
    pub operation: String,
    /// Value to compare against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<f64>,
}

/// Predicate on a boolean attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BooleanCondition {
    /// Operation name.
    pub operation: String,
    /// Value to compare against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<bool>,
}

/// Predicate on an attribute holding a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JsonCondition {
    /// Operation name.
    pub operation: String,
    /// Value or key to compare against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<String>,
    /// JSONPath expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
}

macro_rules! operations {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[doc = concat!("`", $text, "`")]
                $variant,
            )+
        }

        impl $name {
            /// Parses an operation name.
            #[must_use]
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Wire name of the operation.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

operations!(
    /// Operations allowed on string attributes.
    StringOperation {
        Exists => "exists",
        Equals => "equals",
        NotEquals => "not_equals",
        Contains => "contains",
        NotContains => "not_contains",
        Regex => "regex",
    }
);

operations!(
    /// Operations allowed on numeric attributes.
    NumberOperation {
        Exists => "exists",
        Equals => "equals",
        NotEquals => "not_equals",
        GreaterThan => "greater_than",
        LessThan => "less_than",
        GreaterThanOrEqual => "greater_than_or_equal",
        LessThanOrEqual => "less_than_or_equal",
    }
);

operations!(
    /// Operations allowed on boolean attributes.
    BooleanOperation {
        Exists => "exists",
        Equals => "equals",
    }
);

operations!(
    /// Operations allowed on JSON attributes.
    JsonOperation {
        Exists => "exists",
        IsValidJson => "is_valid_json",
        IsInvalidJson => "is_invalid_json",
        Equals => "equals",
        NotEquals => "not_equals",
        ContainsKey => "contains_key",
        NotContainsKey => "not_contains_key",
        JsonPathExists => "jsonpath_exists",
    }
);

impl JsonOperation {
    const fn needs_expected_value(self) -> bool {
        matches!(
            self,
            Self::Equals | Self::NotEquals | Self::ContainsKey | Self::NotContainsKey
        )
    }
}

/// A validated attribute condition with a typed operation.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedCondition {
    /// String predicate.
    String {
        /// Operation.
        operation: StringOperation,
        /// Expected value, absent only for `exists`.
        expected_value: Option<String>,
    },
    /// Number predicate.
    Number {
        /// Operation.
        operation: NumberOperation,
        /// Expected value, absent only for `exists`.
        expected_value: Option<f64>,
    },
    /// Boolean predicate.
    Boolean {
        /// Operation.
        operation: BooleanOperation,
        /// Expected value, required for `equals`.
        expected_value: Option<bool>,
    },
    /// JSON predicate.
    Json {
        /// Operation.
        operation: JsonOperation,
        /// Expected value or key.
        expected_value: Option<String>,
        /// JSONPath expression, required for `jsonpath_exists`.
        json_path: Option<String>,
    },
}

impl TypedCondition {
    /// Condition type discriminator.
    #[must_use]
    pub const fn condition_type(&self) -> &'static str {
        match self {
            Self::String { .. } => "string",
            Self::Number { .. } => "number",
            Self::Boolean { .. } => "boolean",
            Self::Json { .. } => "json",
        }
    }

    /// Wire name of the operation.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::String { operation, .. } => operation.as_str(),
            Self::Number { operation, .. } => operation.as_str(),
            Self::Boolean { operation, .. } => operation.as_str(),
            Self::Json { operation, .. } => operation.as_str(),
        }
    }
}

fn unsupported(condition_type: &'static str, operation: &str) -> ValidationError {
    ValidationError::UnsupportedOperation {
        condition_type,
        operation: operation.to_string(),
    }
}

fn missing(condition_type: &'static str, operation: &str, field: &'static str) -> ValidationError {
    ValidationError::MissingOperand {
        condition_type,
        operation: operation.to_string(),
        field,
    }
}

impl StringCondition {
    fn resolve(&self) -> std::result::Result<TypedCondition, ValidationError> {
        let operation = StringOperation::parse(&self.operation)
            .ok_or_else(|| unsupported("string", &self.operation))?;
        if operation != StringOperation::Exists && self.expected_value.is_none() {
            return Err(missing("string", &self.operation, "expected_value"));
        }
        if let (StringOperation::Regex, Some(pattern)) = (operation, &self.expected_value) {
            regex::Regex::new(pattern).map_err(|e| {
                ValidationError::Invalid(format!("invalid regex '{pattern}': {e}"))
            })?;
        }
        Ok(TypedCondition::String {
            operation,
            expected_value: self.expected_value.clone(),
        })
    }
}

impl NumberCondition {
    fn resolve(&self) -> std::result::Result<TypedCondition, ValidationError> {
        let operation = NumberOperation::parse(&self.operation)
            .ok_or_else(|| unsupported("number", &self.operation))?;
        if operation != NumberOperation::Exists && self.expected_value.is_none() {
            return Err(missing("number", &self.operation, "expected_value"));
        }
        Ok(TypedCondition::Number {
            operation,
            expected_value: self.expected_value,
        })
    }
}

impl BooleanCondition {
    fn resolve(&self) -> std::result::Result<TypedCondition, ValidationError> {
        let operation = BooleanOperation::parse(&self.operation)
            .ok_or_else(|| unsupported("boolean", &self.operation))?;
        if operation == BooleanOperation::Equals && self.expected_value.is_none() {
            return Err(missing("boolean", &self.operation, "expected_value"));
        }
        Ok(TypedCondition::Boolean {
            operation,
            expected_value: self.expected_value,
        })
    }
}

impl JsonCondition {
    fn resolve(&self) -> std::result::Result<TypedCondition, ValidationError> {
        let operation = JsonOperation::parse(&self.operation)
            .ok_or_else(|| unsupported("json", &self.operation))?;
        if operation.needs_expected_value() && self.expected_value.is_none() {
            return Err(missing("json", &self.operation, "expected_value"));
        }
        let has_path = self.json_path.as_deref().is_some_and(|p| !p.trim().is_empty());
        if operation == JsonOperation::JsonPathExists && !has_path {
            return Err(missing("json", &self.operation, "json_path"));
        }
        Ok(TypedCondition::Json {
            operation,
            expected_value: self.expected_value.clone(),
            json_path: self.json_path.clone(),
        })
    }
}

impl AttributeCondition {
    /// Validates the condition and returns its typed form.
    ///
    /// # Errors
    ///
    /// Returns an error unless exactly one condition type is set and that
    /// condition satisfies its operation rules.
    pub fn resolve(&self) -> std::result::Result<TypedCondition, ValidationError> {
        let set = [
            self.string_condition.is_some(),
            self.number_condition.is_some(),
            self.boolean_condition.is_some(),
            self.json_condition.is_some(),
        ]
        .into_iter()
        .filter(|s| *s)
        .count();

        match set {
            0 => return Err(ValidationError::MissingField("condition")),
            1 => {}
            _ => {
                return Err(ValidationError::Invalid(
                    "exactly one condition type must be set".to_string(),
                ))
            }
        }

        if let Some(c) = &self.string_condition {
            c.resolve()
        } else if let Some(c) = &self.number_condition {
            c.resolve()
        } else if let Some(c) = &self.boolean_condition {
            c.resolve()
        } else if let Some(c) = &self.json_condition {
            c.resolve()
        } else {
            Err(ValidationError::MissingField("condition"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(op: &str, expected: Option<&str>) -> AttributeCondition {
        AttributeCondition {
            string_condition: Some(StringCondition {
                operation: op.to_string(),
                expected_value: expected.map(String::from),
            }),
            ..AttributeCondition::default()
        }
    }

    fn json(op: &str, expected: Option<&str>, path: Option<&str>) -> AttributeCondition {
        AttributeCondition {
            json_condition: Some(JsonCondition {
                operation: op.to_string(),
                expected_value: expected.map(String::from),
                json_path: path.map(String::from),
            }),
            ..AttributeCondition::default()
        }
    }

    #[test]
    fn ratio_bounds_are_inclusive() {
        assert!(validate_ratio("r", 0.0).is_ok());
        assert!(validate_ratio("r", 100.0).is_ok());
        assert!(validate_ratio("r", 100.5).is_err());
        assert!(validate_ratio("r", -1.0).is_err());
        assert!(validate_ratio("r", f64::NAN).is_err());
    }

    #[test]
    fn error_sampler_rejects_ratio_above_100() {
        let config = ErrorSamplerConfig {
            fallback_sampling_ratio: 150.0,
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::RatioOutOfRange {
                field: "fallback_sampling_ratio",
                value: "150".to_string(),
            })
        );
    }

    #[test]
    fn string_condition_requires_expected_value_unless_exists() {
        assert!(string("exists", None).resolve().is_ok());
        assert!(string("equals", Some("checkout")).resolve().is_ok());
        assert!(matches!(
            string("contains", None).resolve(),
            Err(ValidationError::MissingOperand { field: "expected_value", .. })
        ));
        assert!(matches!(
            string("starts_with", Some("x")).resolve(),
            Err(ValidationError::UnsupportedOperation { condition_type: "string", .. })
        ));
    }

    #[test]
    fn string_regex_must_compile() {
        assert!(string("regex", Some("^/api/.*$")).resolve().is_ok());
        assert!(string("regex", Some("(unclosed")).resolve().is_err());
    }

    #[test]
    fn number_condition_operations() {
        let cond = |op: &str, v: Option<f64>| AttributeCondition {
            number_condition: Some(NumberCondition {
                operation: op.to_string(),
                expected_value: v,
            }),
            ..AttributeCondition::default()
        };
        assert!(cond("greater_than_or_equal", Some(500.0)).resolve().is_ok());
        assert!(cond("exists", None).resolve().is_ok());
        assert!(cond("less_than", None).resolve().is_err());
        assert!(cond("contains", Some(1.0)).resolve().is_err());
    }

    #[test]
    fn boolean_condition_requires_value_for_equals() {
        let cond = |op: &str, v: Option<bool>| AttributeCondition {
            boolean_condition: Some(BooleanCondition {
                operation: op.to_string(),
                expected_value: v,
            }),
            ..AttributeCondition::default()
        };
        assert!(cond("exists", None).resolve().is_ok());
        assert!(cond("equals", Some(true)).resolve().is_ok());
        assert!(cond("equals", None).resolve().is_err());
        assert!(cond("not_equals", Some(true)).resolve().is_err());
    }

    #[test]
    fn json_condition_operands() {
        assert!(json("is_valid_json", None, None).resolve().is_ok());
        assert!(json("contains_key", Some("user"), None).resolve().is_ok());
        assert!(json("not_contains_key", None, None).resolve().is_err());
        assert!(json("jsonpath_exists", None, Some("$.user.id")).resolve().is_ok());
        assert!(matches!(
            json("jsonpath_exists", None, None).resolve(),
            Err(ValidationError::MissingOperand { field: "json_path", .. })
        ));
        assert!(json("jsonpath_exists", None, Some("  ")).resolve().is_err());
    }

    #[test]
    fn condition_must_have_exactly_one_type() {
        assert_eq!(
            AttributeCondition::default().resolve(),
            Err(ValidationError::MissingField("condition"))
        );
        let mut both = string("exists", None);
        both.boolean_condition = Some(BooleanCondition {
            operation: "exists".to_string(),
            expected_value: None,
        });
        assert!(matches!(both.resolve(), Err(ValidationError::Invalid(_))));
    }

    #[test]
    fn probabilistic_percentage_parses() {
        let config = ProbabilisticSamplerConfig {
            sampling_percentage: " 12.5 ".to_string(),
        };
        assert!((config.percentage().unwrap() - 12.5).abs() < f64::EPSILON);

        let bad = ProbabilisticSamplerConfig {
            sampling_percentage: "half".to_string(),
        };
        assert!(bad.validate().is_err());

        let over = ProbabilisticSamplerConfig {
            sampling_percentage: "101".to_string(),
        };
        assert!(over.validate().is_err());
    }

    #[test]
    fn latency_filter_validation() {
        let filter = HttpRouteFilter {
            http_route: "/checkout".to_string(),
            service_name: "frontend".to_string(),
            minimum_latency_threshold: 500,
            fallback_sampling_ratio: 10.0,
        };
        assert!(filter.validate().is_ok());

        let mut no_slash = filter.clone();
        no_slash.http_route = "checkout".to_string();
        assert!(no_slash.validate().is_err());

        let config = LatencySamplerConfig::default();
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingField("endpoints_filters"))
        );
    }

    #[test]
    fn service_names_must_be_unique() {
        let filter = ServiceNameFilter {
            service_name: "cart".to_string(),
            sampling_ratio: 50.0,
            fallback_sampling_ratio: 5.0,
        };
        let config = ServiceNameSamplerConfig {
            services_name_filters: vec![filter.clone(), filter],
        };
        assert!(config.validate().is_err());
    }

    proptest::proptest! {
        #[test]
        fn ratios_inside_range_validate(ratio in 0.0f64..=100.0) {
            proptest::prop_assert!(validate_ratio("ratio", ratio).is_ok());
        }

        #[test]
        fn ratios_above_range_fail(ratio in 100.000_001f64..1.0e6) {
            let config = ErrorSamplerConfig { fallback_sampling_ratio: ratio };
            proptest::prop_assert!(config.validate().is_err());
        }
    }

    #[test]
    fn legacy_kind_names_round_trip() {
        for kind in SamplerKind::ALL {
            assert_eq!(SamplerKind::from_legacy_kind(kind.legacy_kind()), Some(kind));
        }
        assert_eq!(SamplerKind::from_legacy_kind("Action"), None);
    }
}
