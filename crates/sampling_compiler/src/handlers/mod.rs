//! Action handlers: one per sampler kind.
//!
//! Handlers turn the namespace snapshot into engine inputs. Legacy resources
//! are normalized through [`legacy_to_unified`] first, so a handler only ever
//! reads the `samplers.*` sub-configuration of a unified action regardless of
//! which API era the resource came from.

mod errors;
mod latency;
mod probabilistic;
mod service_name;
mod span_attribute;

pub use errors::ErrorHandler;
pub use latency::{LatencyPolicyHandler, LatencyRuleHandler};
pub use probabilistic::ProbabilisticHandler;
pub use service_name::ServiceNameHandler;
pub use span_attribute::SpanAttributeHandler;

use crate::config::LatencyEngine;
use crate::error::Result;
use crate::policy::{Policy, PolicyType};
use crate::rules::{Rule, RuleScope};
use crate::store::ResourceStore;
use sampling_actions::{
    legacy_to_unified, migrated_name, Action, LegacyAction, ObjectRef, OwnerReference,
    SamplerKind, SamplersConfig, Signal, ValidationError,
};
use std::cmp::Ordering;

/// Snapshot of every sampling resource in one namespace.
///
/// Read once per reconciliation; handlers never go back to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionSet {
    namespace: String,
    actions: Vec<Action>,
    legacy: Vec<LegacyAction>,
}

impl ActionSet {
    /// Creates a snapshot. Resources are ordered by name.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        mut actions: Vec<Action>,
        mut legacy: Vec<LegacyAction>,
    ) -> Self {
        actions.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        legacy.sort_by(|a, b| {
            a.kind()
                .cmp(&b.kind())
                .then_with(|| a.metadata().name.cmp(&b.metadata().name))
        });
        Self {
            namespace: namespace.into(),
            actions,
            legacy,
        }
    }

    /// Reads every supported kind from the store.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn load(store: &dyn ResourceStore, namespace: &str) -> Result<Self> {
        let actions = store.list_actions(namespace)?;
        let mut legacy = Vec::new();
        for kind in SamplerKind::ALL {
            legacy.extend(store.list_legacy(namespace, kind)?);
        }
        Ok(Self::new(namespace, actions, legacy))
    }

    /// Namespace of the snapshot.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Unified actions.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Legacy resources.
    #[must_use]
    pub fn legacy(&self) -> &[LegacyAction] {
        &self.legacy
    }

    /// Returns true if the unified counterpart of `legacy` exists.
    #[must_use]
    pub fn has_migrated(&self, legacy: &LegacyAction) -> bool {
        let name = migrated_name(legacy.kind(), &legacy.metadata().name);
        self.actions.iter().any(|a| a.metadata.name == name)
    }

    /// Every resource carrying a `kind` sub-configuration.
    ///
    /// Unified actions come first. Legacy resources whose unified counterpart
    /// exists are skipped so one intent is never compiled twice.
    #[must_use]
    pub fn candidates(&self, kind: SamplerKind) -> Vec<Candidate> {
        let unified = self
            .actions
            .iter()
            .filter(|a| a.samplers().is_some_and(|s| s.has(kind)))
            .map(Candidate::from_action);
        let legacy = self
            .legacy
            .iter()
            .filter(|l| l.kind() == kind && !self.has_migrated(l))
            .map(Candidate::from_legacy);
        unified.chain(legacy).collect()
    }
}

/// One source resource, normalized to the unified shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Resource the status condition is written to.
    pub source: ObjectRef,
    /// Owner reference placed on emitted processors.
    pub owner: OwnerReference,
    /// Generation of the source resource.
    pub generation: i64,
    /// Unified view of the resource.
    pub action: Action,
}

impl Candidate {
    /// Wraps a unified action.
    #[must_use]
    pub fn from_action(action: &Action) -> Self {
        Self {
            source: action.object_ref(),
            owner: action.owner_reference(),
            generation: action.metadata.generation,
            action: action.clone(),
        }
    }

    /// Wraps a legacy resource through [`legacy_to_unified`].
    #[must_use]
    pub fn from_legacy(legacy: &LegacyAction) -> Self {
        Self {
            source: legacy.object_ref(),
            owner: legacy.owner_reference(),
            generation: legacy.metadata().generation,
            action: legacy_to_unified(legacy),
        }
    }

    /// Name of the source resource.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.source.name
    }

    /// Sampler sub-configurations.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] if the action has none.
    pub fn samplers(&self) -> std::result::Result<&SamplersConfig, ValidationError> {
        self.action
            .samplers()
            .ok_or(ValidationError::MissingField("samplers"))
    }

    /// Orders candidates by name, then by full reference.
    #[must_use]
    pub fn cmp_by_name(&self, other: &Self) -> Ordering {
        self.name()
            .cmp(other.name())
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Checks that a sampler action applies to traces.
///
/// # Errors
///
/// Returns an error if `TRACES` is not among the action's signals.
pub fn require_traces(candidate: &Candidate) -> std::result::Result<(), ValidationError> {
    if candidate.action.spec.signals.contains(&Signal::Traces) {
        Ok(())
    } else {
        Err(ValidationError::Invalid(
            "sampling actions must include the TRACES signal".to_string(),
        ))
    }
}

/// Behavior shared by every handler.
pub trait ActionHandler: Send + Sync {
    /// Sampler kind this handler reads.
    fn kind(&self) -> SamplerKind;

    /// Resources carrying this handler's sub-configuration.
    fn list(&self, actions: &ActionSet) -> Vec<Candidate> {
        actions.candidates(self.kind())
    }

    /// Returns true if the resource is disabled.
    fn is_disabled(&self, candidate: &Candidate) -> bool {
        candidate.action.spec.disabled
    }

    /// Owner reference for emitted processors.
    fn owner_reference(&self, candidate: &Candidate) -> OwnerReference {
        candidate.owner.clone()
    }
}

/// Handler feeding the global sampling (rule) engine.
pub trait RuleHandler: ActionHandler {
    /// Bucket this handler's rules go to.
    fn scope(&self) -> RuleScope;

    /// Extracts rules from a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the sub-configuration is missing or invalid.
    fn rules(&self, candidate: &Candidate) -> std::result::Result<Vec<Rule>, ValidationError>;

    /// Validates extracted rules.
    ///
    /// # Errors
    ///
    /// Returns the first failing rule's error.
    fn validate(&self, rules: &[Rule]) -> std::result::Result<(), ValidationError> {
        rules.iter().try_for_each(|r| r.details.validate())
    }
}

/// A validated policy together with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyContribution {
    /// Source resource.
    pub candidate: Candidate,
    /// Extracted policy.
    pub policy: Policy,
}

/// Handler feeding the tail-sampling (policy) engine.
pub trait PolicyHandler: ActionHandler {
    /// Type of the policies this handler produces.
    fn policy_type(&self) -> PolicyType;

    /// Extracts the policy of a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the sub-configuration is missing or invalid.
    fn policy(&self, candidate: &Candidate) -> std::result::Result<Policy, ValidationError>;

    /// Validates an extracted policy.
    ///
    /// # Errors
    ///
    /// Returns the policy's validation error.
    fn validate(&self, policy: &Policy) -> std::result::Result<(), ValidationError> {
        policy.details.validate()
    }

    /// Picks the single surviving policy among contenders of this type.
    fn select_winner<'a>(
        &self,
        contenders: &'a [PolicyContribution],
    ) -> Option<&'a PolicyContribution>;
}

/// Returns the contender with the lowest key, ties broken by resource name.
pub(crate) fn lowest_by<F>(contenders: &[PolicyContribution], key: F) -> Option<&PolicyContribution>
where
    F: Fn(&PolicyContribution) -> f64,
{
    contenders.iter().min_by(|a, b| {
        key(*a)
            .total_cmp(&key(*b))
            .then_with(|| a.candidate.cmp_by_name(&b.candidate))
    })
}

/// Rule handlers, in registry order.
#[must_use]
pub fn rule_handlers(latency: LatencyEngine) -> Vec<Box<dyn RuleHandler>> {
    let mut handlers: Vec<Box<dyn RuleHandler>> = vec![
        Box::new(ErrorHandler),
        Box::new(ServiceNameHandler),
        Box::new(SpanAttributeHandler),
    ];
    if latency == LatencyEngine::Rules {
        handlers.push(Box::new(LatencyRuleHandler));
    }
    handlers
}

/// Policy handlers, in registry order.
#[must_use]
pub fn policy_handlers(latency: LatencyEngine) -> Vec<Box<dyn PolicyHandler>> {
    let mut handlers: Vec<Box<dyn PolicyHandler>> = Vec::new();
    if latency == LatencyEngine::TailSampling {
        handlers.push(Box::new(LatencyPolicyHandler));
    }
    handlers.push(Box::new(ProbabilisticHandler));
    handlers
}

#[cfg(test)]
pub(crate) mod fixtures {
    use sampling_actions::sampler::{
        AttributeCondition, ErrorSamplerConfig, HttpRouteFilter, LatencySamplerConfig,
        ProbabilisticSamplerConfig, ServiceNameFilter, ServiceNameSamplerConfig,
        SpanAttributeFilter, SpanAttributeSamplerConfig, StringCondition,
    };
    use sampling_actions::{Action, LegacyAction, LegacyResource, SamplersConfig};

    pub fn uid(action: Action) -> Action {
        let uid = format!("uid-{}", action.metadata.name);
        let mut action = action;
        action.metadata.uid = uid;
        action
    }

    pub fn error_action(name: &str, fallback: f64) -> Action {
        uid(Action::new("shop", name).with_samplers(SamplersConfig {
            error_sampler: Some(ErrorSamplerConfig {
                fallback_sampling_ratio: fallback,
            }),
            ..SamplersConfig::default()
        }))
    }

    pub fn probabilistic_config(percentage: &str) -> ProbabilisticSamplerConfig {
        ProbabilisticSamplerConfig {
            sampling_percentage: percentage.to_string(),
        }
    }

    pub fn probabilistic_action(name: &str, percentage: &str) -> Action {
        uid(Action::new("shop", name).with_samplers(SamplersConfig {
            probabilistic_sampler: Some(probabilistic_config(percentage)),
            ..SamplersConfig::default()
        }))
    }

    pub fn latency_config(route: &str, threshold: i64) -> LatencySamplerConfig {
        LatencySamplerConfig {
            endpoints_filters: vec![HttpRouteFilter {
                http_route: route.to_string(),
                service_name: "frontend".to_string(),
                minimum_latency_threshold: threshold,
                fallback_sampling_ratio: 5.0,
            }],
        }
    }

    pub fn latency_action(name: &str, threshold: i64) -> Action {
        uid(Action::new("shop", name).with_samplers(SamplersConfig {
            latency_sampler: Some(latency_config("/checkout", threshold)),
            ..SamplersConfig::default()
        }))
    }

    pub fn service_action(name: &str, services: &[&str]) -> Action {
        uid(Action::new("shop", name).with_samplers(SamplersConfig {
            service_name_sampler: Some(ServiceNameSamplerConfig {
                services_name_filters: services
                    .iter()
                    .map(|s| ServiceNameFilter {
                        service_name: (*s).to_string(),
                        sampling_ratio: 50.0,
                        fallback_sampling_ratio: 5.0,
                    })
                    .collect(),
            }),
            ..SamplersConfig::default()
        }))
    }

    pub fn span_attribute_action(name: &str, key: &str, operation: &str) -> Action {
        uid(Action::new("shop", name).with_samplers(SamplersConfig {
            span_attribute_sampler: Some(SpanAttributeSamplerConfig {
                attribute_filters: vec![SpanAttributeFilter {
                    service_name: "checkout".to_string(),
                    attribute_key: key.to_string(),
                    condition: AttributeCondition {
                        string_condition: Some(StringCondition {
                            operation: operation.to_string(),
                            expected_value: Some("gold".to_string()),
                        }),
                        ..AttributeCondition::default()
                    },
                    sampling_ratio: 100.0,
                    fallback_sampling_ratio: 10.0,
                }],
            }),
            ..SamplersConfig::default()
        }))
    }

    pub fn legacy_error(name: &str, fallback: f64) -> LegacyAction {
        let mut resource = LegacyResource::new(
            "shop",
            name,
            ErrorSamplerConfig {
                fallback_sampling_ratio: fallback,
            },
        );
        resource.metadata.uid = format!("legacy-uid-{name}");
        LegacyAction::Error(resource)
    }

    pub fn legacy_probabilistic(name: &str, percentage: &str) -> LegacyAction {
        let mut resource = LegacyResource::new("shop", name, probabilistic_config(percentage));
        resource.metadata.uid = format!("legacy-uid-{name}");
        LegacyAction::Probabilistic(resource)
    }
}
