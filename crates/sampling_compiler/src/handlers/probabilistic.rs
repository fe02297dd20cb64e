use super::{lowest_by, ActionHandler, Candidate, PolicyContribution, PolicyHandler};
use crate::policy::{Policy, PolicyDetails, PolicyType, ProbabilisticPolicy};
use sampling_actions::{SamplerKind, ValidationError};

/// Probabilistic sampler: one policy per resource, lowest percentage wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbabilisticHandler;

impl ActionHandler for ProbabilisticHandler {
    fn kind(&self) -> SamplerKind {
        SamplerKind::Probabilistic
    }
}

impl PolicyHandler for ProbabilisticHandler {
    fn policy_type(&self) -> PolicyType {
        PolicyType::Probabilistic
    }

    fn policy(&self, candidate: &Candidate) -> Result<Policy, ValidationError> {
        let config = candidate
            .samplers()?
            .probabilistic_sampler
            .as_ref()
            .ok_or(ValidationError::MissingField("probabilisticSampler"))?;
        let sampling_percentage = config.percentage()?;
        Ok(Policy::for_source(
            candidate.name(),
            PolicyDetails::Probabilistic(ProbabilisticPolicy {
                sampling_percentage,
            }),
        ))
    }

    fn select_winner<'a>(
        &self,
        contenders: &'a [PolicyContribution],
    ) -> Option<&'a PolicyContribution> {
        lowest_by(contenders, |c| match &c.policy.details {
            PolicyDetails::Probabilistic(p) => p.sampling_percentage,
            PolicyDetails::Latency(_) => f64::INFINITY,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixtures::{legacy_probabilistic, probabilistic_action};
    use proptest::prelude::*;

    fn contribution(name: &str, percentage: &str) -> PolicyContribution {
        let candidate = Candidate::from_action(&probabilistic_action(name, percentage));
        let policy = ProbabilisticHandler.policy(&candidate).unwrap();
        PolicyContribution { candidate, policy }
    }

    #[test]
    fn lowest_percentage_wins() {
        let contenders = vec![
            contribution("a", "25"),
            contribution("b", "75"),
            contribution("c", "50"),
        ];
        let winner = ProbabilisticHandler.select_winner(&contenders).unwrap();
        assert_eq!(winner.candidate.name(), "a");
        assert_eq!(winner.policy.name, "probabilistic-a");
    }

    #[test]
    fn legacy_resources_share_the_code_path() {
        let candidate = Candidate::from_legacy(&legacy_probabilistic("tenth", "10"));
        let policy = ProbabilisticHandler.policy(&candidate).unwrap();
        assert_eq!(
            policy.details,
            PolicyDetails::Probabilistic(ProbabilisticPolicy {
                sampling_percentage: 10.0
            })
        );
    }

    #[test]
    fn unparsable_percentage_is_invalid() {
        let candidate = Candidate::from_action(&probabilistic_action("p", "ten"));
        assert!(ProbabilisticHandler.policy(&candidate).is_err());
    }

    #[test]
    fn no_contenders_no_winner() {
        assert!(ProbabilisticHandler.select_winner(&[]).is_none());
    }

    proptest! {
        #[test]
        fn winner_does_not_depend_on_input_order(
            percentages in proptest::collection::vec(0u8..=100, 1..8),
            rotation in 0usize..8,
        ) {
            let contenders: Vec<_> = percentages
                .iter()
                .enumerate()
                .map(|(i, p)| contribution(&format!("action-{i}"), &p.to_string()))
                .collect();
            let mut rotated = contenders.clone();
            let len = rotated.len();
            rotated.rotate_left(rotation % len);

            let first = ProbabilisticHandler.select_winner(&contenders).unwrap();
            let second = ProbabilisticHandler.select_winner(&rotated).unwrap();
            prop_assert_eq!(first.candidate.name(), second.candidate.name());

            let lowest = percentages.iter().min().copied().unwrap_or_default();
            prop_assert!((first.policy.details.selection_key() - f64::from(lowest)).abs() < f64::EPSILON);
        }
    }
}
