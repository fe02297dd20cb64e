use super::{ActionHandler, Candidate, RuleHandler};
use crate::rules::{rule_name, ErrorRule, Rule, RuleDetails, RuleScope};
use sampling_actions::{SamplerKind, ValidationError};

/// Error sampler: one global rule per resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorHandler;

impl ActionHandler for ErrorHandler {
    fn kind(&self) -> SamplerKind {
        SamplerKind::Error
    }
}

impl RuleHandler for ErrorHandler {
    fn scope(&self) -> RuleScope {
        RuleScope::Global
    }

    fn rules(&self, candidate: &Candidate) -> Result<Vec<Rule>, ValidationError> {
        let config = candidate
            .samplers()?
            .error_sampler
            .as_ref()
            .ok_or(ValidationError::MissingField("errorSampler"))?;
        config.validate()?;

        Ok(vec![Rule::new(
            rule_name(candidate.name(), &[]),
            RuleDetails::Error(ErrorRule {
                fallback_sampling_ratio: config.fallback_sampling_ratio,
            }),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixtures::error_action;

    #[test]
    fn one_global_rule_named_after_the_action() {
        let candidate = Candidate::from_action(&error_action("errors", 10.0));
        let rules = ErrorHandler.rules(&candidate).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "errors");
        assert!(ErrorHandler.validate(&rules).is_ok());
    }

    #[test]
    fn ratio_above_100_is_invalid() {
        let candidate = Candidate::from_action(&error_action("errors", 150.0));
        assert!(matches!(
            ErrorHandler.rules(&candidate),
            Err(ValidationError::RatioOutOfRange { .. })
        ));
    }
}
