//! Global sampling engine: unions the rules of every enabled, valid action
//! into one `odigossampling` processor.

use crate::config::LatencyEngine;
use crate::error::Result;
use crate::handlers::{require_traces, rule_handlers, ActionSet, Candidate, RuleHandler};
use crate::processor::{Processor, GLOBAL_SAMPLING};
use crate::rules::{Rule, RuleScope, SamplingRulesConfig};
use crate::status::{ActionOutcome, Outcome};
use sampling_actions::{ObjectRef, OwnerReference};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use tracing::{debug, warn};

/// Rules extracted from one resource by one handler.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleContribution {
    /// Source resource.
    pub candidate: Candidate,
    /// Owner reference for the processor.
    pub owner: OwnerReference,
    /// Target bucket.
    pub scope: RuleScope,
    /// Extracted, validated rules.
    pub rules: Vec<Rule>,
}

/// Engine inputs after filtering and validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected<T> {
    /// Valid contributions of enabled resources.
    pub contributions: Vec<T>,
    /// Disabled and invalid resources.
    pub outcomes: Vec<ActionOutcome>,
}

impl<T> Default for Collected<T> {
    fn default() -> Self {
        Self {
            contributions: Vec::new(),
            outcomes: Vec::new(),
        }
    }
}

impl<T> Collected<T> {
    /// Resources that failed validation.
    #[must_use]
    pub fn invalid_sources(&self) -> BTreeSet<ObjectRef> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Invalid(_)))
            .map(|o| o.target.clone())
            .collect()
    }

    pub(crate) fn disabled(&mut self, candidate: &Candidate) {
        debug!("Skipping disabled {}", candidate.source);
        self.outcomes.push(ActionOutcome::new(
            candidate.source.clone(),
            candidate.generation,
            Outcome::Disabled,
        ));
    }

    pub(crate) fn invalid(&mut self, candidate: &Candidate, kind: impl Display, reason: impl Display) {
        warn!("Excluding {}: invalid {}: {}", candidate.source, kind, reason);
        self.outcomes.push(ActionOutcome::new(
            candidate.source.clone(),
            candidate.generation,
            Outcome::Invalid(format!("invalid {kind}: {reason}")),
        ));
    }
}

/// A resource that made it into a processor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Contributor {
    /// Source resource.
    pub target: ObjectRef,
    /// Generation of the source resource.
    pub generation: i64,
}

/// Output of the rule engine for one namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleCompilation {
    /// Sorted rules, or `None` if no rule survived.
    pub config: Option<SamplingRulesConfig>,
    /// Owner references, one per contributing resource, ordered by uid.
    pub owners: Vec<OwnerReference>,
    /// Contributing resources.
    pub contributors: Vec<Contributor>,
}

impl RuleCompilation {
    /// Builds the processor document, or `None` if it should be deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules cannot be serialized.
    pub fn processor(&self, namespace: &str) -> Result<Option<Processor>> {
        let Some(config) = &self.config else {
            return Ok(None);
        };
        let value = serde_json::to_value(config)?;
        Ok(Some(Processor::from_template(
            &GLOBAL_SAMPLING,
            namespace,
            value,
            self.owners.iter().cloned(),
        )))
    }
}

/// The rule-oriented compiler.
pub struct RuleEngine {
    handlers: Vec<Box<dyn RuleHandler>>,
}

impl RuleEngine {
    /// Creates an engine with the given handlers.
    #[must_use]
    pub fn new(handlers: Vec<Box<dyn RuleHandler>>) -> Self {
        Self { handlers }
    }

    /// Creates an engine with the standard handler registry.
    #[must_use]
    pub fn with_registry(latency: LatencyEngine) -> Self {
        Self::new(rule_handlers(latency))
    }

    /// Lists, filters, extracts and validates every handler's resources.
    #[must_use]
    pub fn collect(&self, actions: &ActionSet) -> Collected<RuleContribution> {
        let mut collected = Collected::default();
        for handler in &self.handlers {
            for candidate in handler.list(actions) {
                if handler.is_disabled(&candidate) {
                    collected.disabled(&candidate);
                    continue;
                }
                let extracted = require_traces(&candidate)
                    .and_then(|()| handler.rules(&candidate))
                    .and_then(|rules| handler.validate(&rules).map(|()| rules));
                match extracted {
                    Ok(rules) => collected.contributions.push(RuleContribution {
                        owner: handler.owner_reference(&candidate),
                        scope: handler.scope(),
                        rules,
                        candidate,
                    }),
                    Err(e) => collected.invalid(&candidate, handler.kind(), e),
                }
            }
        }
        collected
    }

    /// Unions contributions into sorted buckets, skipping excluded resources.
    #[must_use]
    pub fn compile(
        &self,
        collected: &Collected<RuleContribution>,
        excluded: &BTreeSet<ObjectRef>,
    ) -> RuleCompilation {
        let mut config = SamplingRulesConfig::default();
        let mut owners: BTreeMap<String, OwnerReference> = BTreeMap::new();
        let mut contributors = BTreeSet::new();

        for contribution in &collected.contributions {
            let source = &contribution.candidate.source;
            if excluded.contains(source) {
                debug!("Skipping rules of excluded {}", source);
                continue;
            }
            for rule in &contribution.rules {
                config.push(contribution.scope, rule.clone());
            }
            owners.insert(contribution.owner.uid.clone(), contribution.owner.clone());
            contributors.insert(Contributor {
                target: source.clone(),
                generation: contribution.candidate.generation,
            });
        }

        if config.is_empty() {
            return RuleCompilation::default();
        }
        config.sort();
        config.dedupe_names();
        config.sort();

        RuleCompilation {
            config: Some(config),
            owners: owners.into_values().collect(),
            contributors: contributors.into_iter().collect(),
        }
    }

    /// Collects and compiles in one step, excluding this engine's invalid resources.
    #[must_use]
    pub fn run(&self, actions: &ActionSet) -> (RuleCompilation, Vec<ActionOutcome>) {
        let collected = self.collect(actions);
        let compilation = self.compile(&collected, &collected.invalid_sources());
        (compilation, collected.outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixtures::*;
    use crate::rules::RuleType;
    use proptest::prelude::*;
    use sampling_actions::sampler::ErrorSamplerConfig;
    use sampling_actions::{Action, SamplersConfig};

    fn engine() -> RuleEngine {
        RuleEngine::with_registry(LatencyEngine::Rules)
    }

    fn compile(actions: Vec<Action>) -> (RuleCompilation, Vec<ActionOutcome>) {
        engine().run(&ActionSet::new("shop", actions, vec![]))
    }

    #[test]
    fn buckets_by_scope() {
        let (compilation, outcomes) = compile(vec![
            error_action("errors", 10.0),
            service_action("ratios", &["cart"]),
            span_attribute_action("tiers", "user.tier", "equals"),
            latency_action("slow", 500),
        ]);
        assert!(outcomes.is_empty());

        let config = compilation.config.unwrap();
        assert_eq!(config.global_rules.len(), 1);
        assert_eq!(config.service_rules.len(), 2);
        assert_eq!(config.endpoint_rules.len(), 1);
        assert_eq!(config.global_rules[0].rule_type(), RuleType::Error);
        assert_eq!(compilation.owners.len(), 4);
    }

    #[test]
    fn empty_union_produces_no_processor() {
        let (compilation, _) = compile(vec![error_action("errors", 10.0).disabled()]);
        assert!(compilation.config.is_none());
        assert!(compilation.processor("shop").unwrap().is_none());
    }

    #[test]
    fn invalid_action_is_isolated() {
        let (compilation, outcomes) = compile(vec![
            error_action("good", 10.0),
            error_action("bad", 150.0),
        ]);
        let config = compilation.config.unwrap();
        assert_eq!(config.global_rules.len(), 1);
        assert_eq!(config.global_rules[0].name, "good");
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].target.name, "bad");
        assert!(matches!(outcomes[0].outcome, Outcome::Invalid(_)));
    }

    #[test]
    fn action_with_one_invalid_sub_config_is_excluded_whole() {
        let mut action = service_action("mixed", &["cart"]);
        action.spec.samplers.as_mut().unwrap().error_sampler = Some(ErrorSamplerConfig {
            fallback_sampling_ratio: -5.0,
        });
        let (compilation, outcomes) = compile(vec![action]);
        assert!(compilation.config.is_none());
        assert_eq!(outcomes.len(), 1);
    }

    #[test]
    fn unified_action_with_several_samplers_is_one_owner() {
        let mut action = error_action("combo", 10.0);
        action.spec.samplers = Some(SamplersConfig {
            service_name_sampler: service_action("x", &["cart"])
                .spec
                .samplers
                .and_then(|s| s.service_name_sampler),
            ..action.spec.samplers.unwrap_or_default()
        });
        let (compilation, _) = compile(vec![action]);
        assert_eq!(compilation.owners.len(), 1);
        assert_eq!(compilation.contributors.len(), 1);
        assert_eq!(compilation.config.unwrap().len(), 2);
    }

    #[test]
    fn processor_document() {
        let (compilation, _) = compile(vec![error_action("errors", 10.0)]);
        let processor = compilation.processor("shop").unwrap().unwrap();
        assert_eq!(processor.spec.processor_type, "odigossampling");
        assert_eq!(processor.spec.order_hint, -24);
        insta::assert_snapshot!(
            serde_json::to_string(&processor.spec.config).unwrap(),
            @r#"{"global_rules":[{"name":"errors","type":"error","rule_details":{"fallback_sampling_ratio":10.0}}],"service_rules":[],"endpoint_rules":[]}"#
        );
    }

    #[test]
    fn same_named_resources_of_both_eras_get_distinct_rule_names() {
        let set = ActionSet::new(
            "shop",
            vec![error_action("errors", 10.0)],
            vec![legacy_error("errors", 20.0)],
        );
        let (compilation, _) = engine().run(&set);
        let names: Vec<_> = compilation
            .config
            .unwrap()
            .global_rules
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["errors", "errors#2"]);
        assert_eq!(compilation.owners.len(), 2);
    }

    proptest! {
        #[test]
        fn output_is_independent_of_input_order(
            ratios in proptest::collection::vec(0u8..=100, 1..6),
            rotation in 0usize..6,
        ) {
            let actions: Vec<Action> = ratios
                .iter()
                .enumerate()
                .map(|(i, r)| error_action(&format!("errors-{i}"), f64::from(*r)))
                .collect();
            let mut rotated = actions.clone();
            let len = rotated.len();
            rotated.rotate_left(rotation % len);

            let (a, _) = compile(actions);
            let (b, _) = compile(rotated);
            let a = serde_json::to_string(&a.processor("shop").unwrap()).unwrap();
            let b = serde_json::to_string(&b.processor("shop").unwrap()).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn union_has_one_rule_per_valid_action(
            ratios in proptest::collection::vec(-50i16..=200, 0..8),
        ) {
            let actions: Vec<Action> = ratios
                .iter()
                .enumerate()
                .map(|(i, r)| error_action(&format!("errors-{i}"), f64::from(*r)))
                .collect();
            let valid = ratios.iter().filter(|r| (0..=100).contains(*r)).count();

            let (compilation, outcomes) = compile(actions);
            let rules = compilation.config.map_or(0, |c| c.global_rules.len());
            prop_assert_eq!(rules, valid);
            prop_assert_eq!(compilation.owners.len(), valid);
            prop_assert_eq!(outcomes.len(), ratios.len() - valid);
        }
    }
}
