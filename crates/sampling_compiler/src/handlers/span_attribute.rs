use super::{ActionHandler, Candidate, RuleHandler};
use crate::rules::{rule_name, Rule, RuleDetails, RuleScope, SpanAttributeRule};
use sampling_actions::{SamplerKind, ValidationError};

/// Span-attribute sampler: one service rule per attribute filter.
///
/// The filter's condition is resolved into its typed form here, so an
/// unsupported operation or a missing operand excludes the whole resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanAttributeHandler;

impl ActionHandler for SpanAttributeHandler {
    fn kind(&self) -> SamplerKind {
        SamplerKind::SpanAttribute
    }
}

impl RuleHandler for SpanAttributeHandler {
    fn scope(&self) -> RuleScope {
        RuleScope::Service
    }

    fn rules(&self, candidate: &Candidate) -> Result<Vec<Rule>, ValidationError> {
        let config = candidate
            .samplers()?
            .span_attribute_sampler
            .as_ref()
            .ok_or(ValidationError::MissingField("spanAttributeSampler"))?;
        if config.attribute_filters.is_empty() {
            return Err(ValidationError::MissingField("attribute_filters"));
        }

        config
            .attribute_filters
            .iter()
            .map(|filter| {
                let condition = filter.validate()?;
                Ok(Rule::new(
                    rule_name(
                        candidate.name(),
                        &[filter.service_name.as_str(), filter.attribute_key.as_str()],
                    ),
                    RuleDetails::SpanAttribute(SpanAttributeRule {
                        service_name: filter.service_name.clone(),
                        attribute_key: filter.attribute_key.clone(),
                        condition,
                        sampling_ratio: filter.sampling_ratio,
                        fallback_sampling_ratio: filter.fallback_sampling_ratio,
                    }),
                ))
            })
            .collect()
    }
}
