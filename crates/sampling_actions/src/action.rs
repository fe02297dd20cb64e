//! Unified and legacy sampling action resources.

use crate::meta::{
    ObjectMeta, ObjectRef, OwnerReference, Signal, Status, ACTION_API_VERSION, LEGACY_API_VERSION,
};
use crate::sampler::{
    ErrorSamplerConfig, LatencySamplerConfig, ProbabilisticSamplerConfig, SamplerKind,
    ServiceNameSamplerConfig, SpanAttributeSamplerConfig,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind name of the unified action resource.
pub const ACTION_KIND: &str = "Action";

/// The unified action resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired behavior.
    pub spec: ActionSpec,
    /// Observed state, written by the compiler.
    #[serde(default, skip_serializing_if = "is_empty_status")]
    pub status: Status,
}

fn is_empty_status(status: &Status) -> bool {
    status.conditions.is_empty()
}

/// Spec of a unified action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    /// Display name chosen by the author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_name: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Disabled actions are ignored by the compiler.
    #[serde(default)]
    pub disabled: bool,
    /// Signals this action applies to.
    #[serde(default)]
    pub signals: Vec<Signal>,
    /// Embedded sampler sub-configurations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samplers: Option<SamplersConfig>,
}

/// Sampler sub-configurations of a unified action. Any subset may be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SamplersConfig {
    /// Latency sampler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_sampler: Option<LatencySamplerConfig>,
    /// Error sampler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_sampler: Option<ErrorSamplerConfig>,
    /// Probabilistic sampler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilistic_sampler: Option<ProbabilisticSamplerConfig>,
    /// Service-name sampler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name_sampler: Option<ServiceNameSamplerConfig>,
    /// Span-attribute sampler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_attribute_sampler: Option<SpanAttributeSamplerConfig>,
}

impl SamplersConfig {
    /// Returns true if the given sampler kind is configured.
    #[must_use]
    pub const fn has(&self, kind: SamplerKind) -> bool {
        match kind {
            SamplerKind::Latency => self.latency_sampler.is_some(),
            SamplerKind::Error => self.error_sampler.is_some(),
            SamplerKind::Probabilistic => self.probabilistic_sampler.is_some(),
            SamplerKind::ServiceName => self.service_name_sampler.is_some(),
            SamplerKind::SpanAttribute => self.span_attribute_sampler.is_some(),
        }
    }

    /// Configured sampler kinds, in registry order.
    #[must_use]
    pub fn kinds(&self) -> Vec<SamplerKind> {
        SamplerKind::ALL.into_iter().filter(|k| self.has(*k)).collect()
    }
}

impl Action {
    /// Creates an enabled trace action with no samplers.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: ActionSpec {
                signals: vec![Signal::Traces],
                ..ActionSpec::default()
            },
            status: Status::default(),
        }
    }

    /// Sets the sampler sub-configurations.
    #[must_use]
    pub fn with_samplers(mut self, samplers: SamplersConfig) -> Self {
        self.spec.samplers = Some(samplers);
        self
    }

    /// Marks the action disabled.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.spec.disabled = true;
        self
    }

    /// Object reference of this action.
    #[must_use]
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(ACTION_KIND, &self.metadata.namespace, &self.metadata.name)
    }

    /// Owner reference pointing at this action.
    #[must_use]
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: ACTION_API_VERSION.to_string(),
            kind: ACTION_KIND.to_string(),
            name: self.metadata.name.clone(),
            uid: self.metadata.uid.clone(),
        }
    }

    /// Sampler sub-configurations, if any.
    #[must_use]
    pub const fn samplers(&self) -> Option<&SamplersConfig> {
        self.spec.samplers.as_ref()
    }
}

/// Fields shared by every legacy sampler spec, plus the kind-specific payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegacySpec<C> {
    /// Display name chosen by the author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_name: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Disabled resources are ignored.
    #[serde(default)]
    pub disabled: bool,
    /// Signals this resource applies to.
    #[serde(default)]
    pub signals: Vec<Signal>,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub config: C,
}

/// A legacy single-purpose sampler resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LegacyResource<C> {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired behavior.
    pub spec: LegacySpec<C>,
    /// Observed state.
    #[serde(default, skip_serializing_if = "is_empty_status")]
    pub status: Status,
}

impl<C> LegacyResource<C> {
    /// Creates an enabled trace resource with the given payload.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, config: C) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: LegacySpec {
                action_name: None,
                notes: None,
                disabled: false,
                signals: vec![Signal::Traces],
                config,
            },
            status: Status::default(),
        }
    }
}

/// Any legacy sampler resource.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyAction {
    /// `LatencySampler`.
    Latency(LegacyResource<LatencySamplerConfig>),
    /// `ErrorSampler`.
    Error(LegacyResource<ErrorSamplerConfig>),
    /// `ProbabilisticSampler`.
    Probabilistic(LegacyResource<ProbabilisticSamplerConfig>),
    /// `ServiceNameSampler`.
    ServiceName(LegacyResource<ServiceNameSamplerConfig>),
    /// `SpanAttributeSampler`.
    SpanAttribute(LegacyResource<SpanAttributeSamplerConfig>),
}

macro_rules! each_legacy {
    ($value:expr, $r:ident => $body:expr) => {
        match $value {
            LegacyAction::Latency($r) => $body,
            LegacyAction::Error($r) => $body,
            LegacyAction::Probabilistic($r) => $body,
            LegacyAction::ServiceName($r) => $body,
            LegacyAction::SpanAttribute($r) => $body,
        }
    };
}

impl LegacyAction {
    /// Sampler kind carried by this resource.
    #[must_use]
    pub const fn kind(&self) -> SamplerKind {
        match self {
            Self::Latency(_) => SamplerKind::Latency,
            Self::Error(_) => SamplerKind::Error,
            Self::Probabilistic(_) => SamplerKind::Probabilistic,
            Self::ServiceName(_) => SamplerKind::ServiceName,
            Self::SpanAttribute(_) => SamplerKind::SpanAttribute,
        }
    }

    /// Object metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ObjectMeta {
        each_legacy!(self, r => &r.metadata)
    }

    /// Mutable object metadata.
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        each_legacy!(self, r => &mut r.metadata)
    }

    /// Observed state.
    #[must_use]
    pub const fn status(&self) -> &Status {
        each_legacy!(self, r => &r.status)
    }

    /// Mutable observed state.
    pub fn status_mut(&mut self) -> &mut Status {
        each_legacy!(self, r => &mut r.status)
    }

    /// Returns true if the resource is disabled.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        each_legacy!(self, r => r.spec.disabled)
    }

    /// Object reference of this resource.
    #[must_use]
    pub fn object_ref(&self) -> ObjectRef {
        let meta = self.metadata();
        ObjectRef::new(self.kind().legacy_kind(), &meta.namespace, &meta.name)
    }

    /// Owner reference pointing at this resource.
    #[must_use]
    pub fn owner_reference(&self) -> OwnerReference {
        let meta = self.metadata();
        OwnerReference {
            api_version: LEGACY_API_VERSION.to_string(),
            kind: self.kind().legacy_kind().to_string(),
            name: meta.name.clone(),
            uid: meta.uid.clone(),
        }
    }
}
