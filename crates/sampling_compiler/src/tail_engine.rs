//! Tail-sampling engine: one winning policy per type, emitted either as a
//! `tail_sampling` processor or, when only probabilistic policies exist, as a
//! head `probabilistic_sampler`.

use crate::config::LatencyEngine;
use crate::error::Result;
use crate::handlers::{
    policy_handlers, require_traces, ActionSet, PolicyContribution, PolicyHandler,
};
use crate::policy::{PolicyDetails, PolicyType, ProbabilisticSamplerSettings, TailSamplingConfig};
use crate::processor::{Processor, ProcessorTemplate, PROBABILISTIC_SAMPLER, TAIL_SAMPLING};
use crate::rule_engine::{Collected, Contributor};
use crate::status::{ActionOutcome, Outcome};
use sampling_actions::{ObjectRef, OwnerReference};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

/// Processor topology of a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TailTopology {
    /// No policies: both processors are deleted.
    #[default]
    Empty,
    /// Only probabilistic policies: a head sampler on every node.
    ProbabilisticOnly,
    /// At least one non-probabilistic policy: one tail sampler on the gateway.
    Combined,
}

impl fmt::Display for TailTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::ProbabilisticOnly => write!(f, "probabilistic-only"),
            Self::Combined => write!(f, "combined"),
        }
    }
}

/// Output of the tail-sampling engine for one namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TailCompilation {
    /// Chosen topology.
    pub topology: TailTopology,
    /// One winner per policy type, ordered by type.
    pub winners: Vec<PolicyContribution>,
    /// Losers of winner selection.
    pub outcomes: Vec<ActionOutcome>,
}

impl TailCompilation {
    /// Template of the processor to emit, if any.
    #[must_use]
    pub fn template(&self) -> Option<&'static ProcessorTemplate> {
        match self.topology {
            TailTopology::Empty => None,
            TailTopology::ProbabilisticOnly => Some(&PROBABILISTIC_SAMPLER),
            TailTopology::Combined => Some(&TAIL_SAMPLING),
        }
    }

    /// Templates of processors that must not exist under this topology.
    #[must_use]
    pub fn stale_templates(&self) -> Vec<&'static ProcessorTemplate> {
        match self.topology {
            TailTopology::Empty => vec![&TAIL_SAMPLING, &PROBABILISTIC_SAMPLER],
            TailTopology::ProbabilisticOnly => vec![&TAIL_SAMPLING],
            TailTopology::Combined => vec![&PROBABILISTIC_SAMPLER],
        }
    }

    /// Owner references of the winners, ordered by uid.
    #[must_use]
    pub fn owners(&self) -> Vec<OwnerReference> {
        let owners: BTreeMap<&str, &OwnerReference> = self
            .winners
            .iter()
            .map(|w| (w.candidate.owner.uid.as_str(), &w.candidate.owner))
            .collect();
        owners.into_values().cloned().collect()
    }

    /// Winning resources.
    #[must_use]
    pub fn contributors(&self) -> Vec<Contributor> {
        let contributors: BTreeSet<Contributor> = self
            .winners
            .iter()
            .map(|w| Contributor {
                target: w.candidate.source.clone(),
                generation: w.candidate.generation,
            })
            .collect();
        contributors.into_iter().collect()
    }

    /// Builds the processor document for the topology, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized.
    pub fn processor(&self, namespace: &str) -> Result<Option<Processor>> {
        let config = match self.topology {
            TailTopology::Empty => return Ok(None),
            TailTopology::ProbabilisticOnly => {
                let Some(PolicyDetails::Probabilistic(p)) =
                    self.winners.first().map(|w| &w.policy.details)
                else {
                    return Ok(None);
                };
                serde_json::to_value(ProbabilisticSamplerSettings {
                    sampling_percentage: p.sampling_percentage,
                })?
            }
            TailTopology::Combined => serde_json::to_value(TailSamplingConfig {
                policies: self.winners.iter().map(|w| w.policy.clone()).collect(),
            })?,
        };
        Ok(self.template().map(|template| {
            Processor::from_template(template, namespace, config, self.owners())
        }))
    }
}

/// The policy-oriented compiler.
pub struct TailEngine {
    handlers: Vec<Box<dyn PolicyHandler>>,
}

impl TailEngine {
    /// Creates an engine with the given handlers.
    #[must_use]
    pub fn new(handlers: Vec<Box<dyn PolicyHandler>>) -> Self {
        Self { handlers }
    }

    /// Creates an engine with the standard handler registry.
    #[must_use]
    pub fn with_registry(latency: LatencyEngine) -> Self {
        Self::new(policy_handlers(latency))
    }

    /// Lists, filters, extracts and validates every handler's resources.
    #[must_use]
    pub fn collect(&self, actions: &ActionSet) -> Collected<PolicyContribution> {
        let mut collected = Collected::default();
        for handler in &self.handlers {
            for candidate in handler.list(actions) {
                if handler.is_disabled(&candidate) {
                    collected.disabled(&candidate);
                    continue;
                }
                let extracted = require_traces(&candidate)
                    .and_then(|()| handler.policy(&candidate))
                    .and_then(|policy| handler.validate(&policy).map(|()| policy));
                match extracted {
                    Ok(policy) => collected
                        .contributions
                        .push(PolicyContribution { candidate, policy }),
                    Err(e) => collected.invalid(&candidate, handler.kind(), e),
                }
            }
        }
        collected
    }

    /// Selects one winner per handler and chooses the topology.
    #[must_use]
    pub fn compile(
        &self,
        collected: &Collected<PolicyContribution>,
        excluded: &BTreeSet<ObjectRef>,
    ) -> TailCompilation {
        let mut winners = Vec::new();
        let mut outcomes = Vec::new();

        for handler in &self.handlers {
            let contenders: Vec<PolicyContribution> = collected
                .contributions
                .iter()
                .filter(|c| {
                    c.policy.policy_type() == handler.policy_type()
                        && !excluded.contains(&c.candidate.source)
                })
                .cloned()
                .collect();

            let Some(winner) = handler.select_winner(&contenders) else {
                continue;
            };
            let losers = contenders
                .iter()
                .filter(|c| c.candidate.source != winner.candidate.source);
            for loser in losers {
                debug!(
                    "{} superseded by {} for {} policy",
                    loser.candidate.source,
                    winner.candidate.source,
                    loser.policy.policy_type()
                );
                outcomes.push(ActionOutcome::new(
                    loser.candidate.source.clone(),
                    loser.candidate.generation,
                    Outcome::Superseded {
                        winner: winner.candidate.name().to_string(),
                    },
                ));
            }
            winners.push(winner.clone());
        }

        winners.sort_by_key(|w| w.policy.policy_type());
        let topology = if winners.is_empty() {
            TailTopology::Empty
        } else if winners
            .iter()
            .all(|w| w.policy.policy_type() == PolicyType::Probabilistic)
        {
            TailTopology::ProbabilisticOnly
        } else {
            TailTopology::Combined
        };
        info!("Tail sampling topology: {} ({} policies)", topology, winners.len());

        TailCompilation {
            topology,
            winners,
            outcomes,
        }
    }

    /// Collects and compiles in one step, excluding this engine's invalid resources.
    #[must_use]
    pub fn run(&self, actions: &ActionSet) -> (TailCompilation, Vec<ActionOutcome>) {
        let collected = self.collect(actions);
        let compilation = self.compile(&collected, &collected.invalid_sources());
        (compilation, collected.outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixtures::*;
    use crate::status::MULTIPLE_SIMILAR_ACTIONS_MESSAGE;
    use sampling_actions::Action;

    fn engine() -> TailEngine {
        TailEngine::with_registry(LatencyEngine::TailSampling)
    }

    fn compile(actions: Vec<Action>) -> (TailCompilation, Vec<ActionOutcome>) {
        engine().run(&ActionSet::new("shop", actions, vec![]))
    }

    #[test]
    fn empty_namespace_deletes_both_processors() {
        let (compilation, _) = compile(vec![]);
        assert_eq!(compilation.topology, TailTopology::Empty);
        assert!(compilation.processor("shop").unwrap().is_none());
        assert_eq!(compilation.stale_templates().len(), 2);
    }

    #[test]
    fn probabilistic_only_picks_lowest_percentage() {
        let (compilation, _) = compile(vec![
            probabilistic_action("a", "25"),
            probabilistic_action("b", "75"),
            probabilistic_action("c", "50"),
        ]);
        assert_eq!(compilation.topology, TailTopology::ProbabilisticOnly);
        assert_eq!(compilation.winners[0].candidate.name(), "a");

        let losers: Vec<_> = compilation
            .outcomes
            .iter()
            .map(|o| o.target.name.as_str())
            .collect();
        assert_eq!(losers, vec!["b", "c"]);

        let processor = compilation.processor("shop").unwrap().unwrap();
        assert_eq!(processor.spec.processor_type, "probabilistic_sampler");
        assert_eq!(processor.spec.order_hint, 1);
        assert_eq!(processor.owners().len(), 1);
        insta::assert_snapshot!(
            serde_json::to_string(&processor.spec.config).unwrap(),
            @r#"{"sampling_percentage":25.0}"#
        );
    }

    #[test]
    fn latency_present_switches_to_combined() {
        let (compilation, _) = compile(vec![
            latency_action("l1", 100),
            latency_action("l2", 50),
            latency_action("l3", 200),
            probabilistic_action("p", "10"),
        ]);
        assert_eq!(compilation.topology, TailTopology::Combined);
        assert_eq!(compilation.stale_templates(), vec![&PROBABILISTIC_SAMPLER]);

        let processor = compilation.processor("shop").unwrap().unwrap();
        assert_eq!(processor.spec.processor_type, "tail_sampling");
        assert_eq!(processor.spec.order_hint, -25);
        assert_eq!(processor.owners().len(), 2);
        insta::assert_snapshot!(
            serde_json::to_string(&processor.spec.config).unwrap(),
            @r#"{"policies":[{"name":"latency-l2","type":"latency","latency":{"threshold_ms":50}},{"name":"probabilistic-p","type":"probabilistic","probabilistic":{"sampling_percentage":10.0}}]}"#
        );
    }

    #[test]
    fn losers_are_superseded_by_the_winner() {
        let (compilation, _) = compile(vec![latency_action("slow", 300), latency_action("fast", 30)]);
        assert_eq!(compilation.outcomes.len(), 1);
        assert_eq!(
            compilation.outcomes[0].outcome,
            Outcome::Superseded {
                winner: "fast".to_string()
            }
        );
        let merged = crate::status::merge_outcomes(&compilation.outcomes);
        let condition = merged.values().next().unwrap();
        assert_eq!(condition.message, MULTIPLE_SIMILAR_ACTIONS_MESSAGE);
    }

    #[test]
    fn excluded_sources_never_win() {
        let engine = engine();
        let set = ActionSet::new(
            "shop",
            vec![probabilistic_action("low", "1"), probabilistic_action("high", "90")],
            vec![],
        );
        let collected = engine.collect(&set);
        let excluded = BTreeSet::from([probabilistic_action("low", "1").object_ref()]);
        let compilation = engine.compile(&collected, &excluded);
        assert_eq!(compilation.winners[0].candidate.name(), "high");
        assert!(compilation.outcomes.is_empty());
    }

    #[test]
    fn latency_is_ignored_when_routed_to_rules() {
        let engine = TailEngine::with_registry(LatencyEngine::Rules);
        let set = ActionSet::new("shop", vec![latency_action("slow", 300)], vec![]);
        let (compilation, outcomes) = engine.run(&set);
        assert_eq!(compilation.topology, TailTopology::Empty);
        assert!(outcomes.is_empty());
    }
}
