use super::{
    lowest_by, ActionHandler, Candidate, PolicyContribution, PolicyHandler, RuleHandler,
};
use crate::policy::{LatencyPolicy, Policy, PolicyDetails, PolicyType};
use crate::rules::{rule_name, LatencyRule, Rule, RuleDetails, RuleScope};
use sampling_actions::sampler::LatencySamplerConfig;
use sampling_actions::{SamplerKind, ValidationError};

fn latency_config(candidate: &Candidate) -> Result<&LatencySamplerConfig, ValidationError> {
    let config = candidate
        .samplers()?
        .latency_sampler
        .as_ref()
        .ok_or(ValidationError::MissingField("latencySampler"))?;
    config.validate()?;
    Ok(config)
}

/// Latency sampler compiled into endpoint rules, one per filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyRuleHandler;

impl ActionHandler for LatencyRuleHandler {
    fn kind(&self) -> SamplerKind {
        SamplerKind::Latency
    }
}

impl RuleHandler for LatencyRuleHandler {
    fn scope(&self) -> RuleScope {
        RuleScope::Endpoint
    }

    fn rules(&self, candidate: &Candidate) -> Result<Vec<Rule>, ValidationError> {
        let config = latency_config(candidate)?;
        Ok(config
            .endpoints_filters
            .iter()
            .map(|filter| {
                Rule::new(
                    rule_name(
                        candidate.name(),
                        &[filter.service_name.as_str(), filter.http_route.as_str()],
                    ),
                    RuleDetails::Latency(LatencyRule {
                        service_name: filter.service_name.clone(),
                        http_route: filter.http_route.clone(),
                        threshold: filter.minimum_latency_threshold,
                        fallback_sampling_ratio: filter.fallback_sampling_ratio,
                    }),
                )
            })
            .collect())
    }
}

/// Latency sampler compiled into one tail-sampling policy.
///
/// The policy threshold is the lowest threshold across the resource's
/// filters; the winner is the resource with the lowest threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyPolicyHandler;

impl ActionHandler for LatencyPolicyHandler {
    fn kind(&self) -> SamplerKind {
        SamplerKind::Latency
    }
}

impl PolicyHandler for LatencyPolicyHandler {
    fn policy_type(&self) -> PolicyType {
        PolicyType::Latency
    }

    fn policy(&self, candidate: &Candidate) -> Result<Policy, ValidationError> {
        let config = latency_config(candidate)?;
        let threshold_ms = config
            .min_threshold()
            .ok_or(ValidationError::MissingField("endpoints_filters"))?;
        Ok(Policy::for_source(
            candidate.name(),
            PolicyDetails::Latency(LatencyPolicy { threshold_ms }),
        ))
    }

    #[allow(clippy::cast_precision_loss)]
    fn select_winner<'a>(
        &self,
        contenders: &'a [PolicyContribution],
    ) -> Option<&'a PolicyContribution> {
        lowest_by(contenders, |c| match &c.policy.details {
            PolicyDetails::Latency(p) => p.threshold_ms as f64,
            PolicyDetails::Probabilistic(_) => f64::INFINITY,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixtures::{latency_action, latency_config as filters};

    fn contribution(name: &str, threshold: i64) -> PolicyContribution {
        let candidate = Candidate::from_action(&latency_action(name, threshold));
        let policy = LatencyPolicyHandler.policy(&candidate).unwrap();
        PolicyContribution { candidate, policy }
    }

    #[test]
    fn endpoint_rule_per_filter() {
        let candidate = Candidate::from_action(&latency_action("slow", 500));
        let rules = LatencyRuleHandler.rules(&candidate).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "slow/frontend//checkout");
        assert_eq!(LatencyRuleHandler.scope(), RuleScope::Endpoint);
    }

    #[test]
    fn policy_uses_lowest_filter_threshold() {
        let mut action = latency_action("slow", 900);
        let samplers = action.spec.samplers.as_mut().unwrap();
        let latency = samplers.latency_sampler.as_mut().unwrap();
        latency
            .endpoints_filters
            .extend(filters("/cart", 300).endpoints_filters);

        let policy = LatencyPolicyHandler
            .policy(&Candidate::from_action(&action))
            .unwrap();
        assert_eq!(policy.name, "latency-slow");
        assert_eq!(
            policy.details,
            PolicyDetails::Latency(LatencyPolicy { threshold_ms: 300 })
        );
    }

    #[test]
    fn lowest_threshold_wins() {
        let contenders = vec![
            contribution("a", 100),
            contribution("b", 50),
            contribution("c", 200),
        ];
        let winner = LatencyPolicyHandler.select_winner(&contenders).unwrap();
        assert_eq!(winner.candidate.name(), "b");
    }

    #[test]
    fn equal_thresholds_break_ties_by_name() {
        let contenders = vec![contribution("zeta", 50), contribution("alpha", 50)];
        let winner = LatencyPolicyHandler.select_winner(&contenders).unwrap();
        assert_eq!(winner.candidate.name(), "alpha");
    }
}
