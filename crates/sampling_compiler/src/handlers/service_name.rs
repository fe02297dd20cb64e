use super::{ActionHandler, Candidate, RuleHandler};
use crate::rules::{rule_name, Rule, RuleDetails, RuleScope, ServiceNameRule};
use sampling_actions::{SamplerKind, ValidationError};

/// Service-name sampler: one service rule per filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceNameHandler;

impl ActionHandler for ServiceNameHandler {
    fn kind(&self) -> SamplerKind {
        SamplerKind::ServiceName
    }
}

impl RuleHandler for ServiceNameHandler {
    fn scope(&self) -> RuleScope {
        RuleScope::Service
    }

    fn rules(&self, candidate: &Candidate) -> Result<Vec<Rule>, ValidationError> {
        let config = candidate
            .samplers()?
            .service_name_sampler
            .as_ref()
            .ok_or(ValidationError::MissingField("serviceNameSampler"))?;
        config.validate()?;

        Ok(config
            .services_name_filters
            .iter()
            .map(|filter| {
                Rule::new(
                    rule_name(candidate.name(), &[filter.service_name.as_str()]),
                    RuleDetails::ServiceName(ServiceNameRule {
                        service_name: filter.service_name.clone(),
                        sampling_ratio: filter.sampling_ratio,
                        fallback_sampling_ratio: filter.fallback_sampling_ratio,
                    }),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixtures::service_action;

    #[test]
    fn rule_per_service() {
        let candidate = Candidate::from_action(&service_action("ratios", &["cart", "search"]));
        let names: Vec<_> = ServiceNameHandler
            .rules(&candidate)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["ratios/cart", "ratios/search"]);
    }

    #[test]
    fn duplicate_services_are_invalid() {
        let candidate = Candidate::from_action(&service_action("ratios", &["cart", "cart"]));
        assert!(ServiceNameHandler.rules(&candidate).is_err());
    }
}
