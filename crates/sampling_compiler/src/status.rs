//! Status conditions written back onto actions.
//!
//! Every engine reports an [`ActionOutcome`] per source resource it touched.
//! A unified action can be touched by several handlers (one per sampler
//! sub-configuration), so outcomes are merged into one condition per
//! resource before they are written.

use crate::error::{Error, Result};
use crate::store::ResourceStore;
use sampling_actions::{Condition, ConditionStatus, ObjectRef, ACTION_KIND};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, warn};

/// Condition type recording whether an action reached a processor.
pub const TRANSFORMED_TO_PROCESSOR: &str = "TransformedToProcessor";

/// Condition type recording that a legacy resource was migrated.
pub const MIGRATED: &str = "Migrated";

/// Message given to actions that lost a winner selection.
pub const MULTIPLE_SIMILAR_ACTIONS_MESSAGE: &str =
    "multiple similar actions found; selected the most appropriate one";

/// Machine-readable condition reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Compiled into a processor.
    ProcessorCreated,
    /// Failed validation.
    InvalidConfig,
    /// Lost a winner selection.
    MultipleSimilarActions,
    /// Disabled by its author.
    ActionDisabled,
    /// The processor it feeds could not be written.
    FailedToCreateProcessor,
    /// A unified counterpart was synthesized.
    MigratedToAction,
}

impl Reason {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProcessorCreated => "ProcessorCreated",
            Self::InvalidConfig => "InvalidConfig",
            Self::MultipleSimilarActions => "MultipleSimilarActions",
            Self::ActionDisabled => "ActionDisabled",
            Self::FailedToCreateProcessor => "FailedToCreateProcessor",
            Self::MigratedToAction => "MigratedToAction",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one source resource in one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Contributed to the named processor.
    Compiled {
        /// Processor name.
        processor: String,
    },
    /// Failed validation.
    Invalid(String),
    /// Disabled.
    Disabled,
    /// Lost against another action of the same policy type.
    Superseded {
        /// Name of the winning resource.
        winner: String,
    },
    /// The processor it feeds could not be written.
    Failed(String),
}

impl Outcome {
    // Higher wins when outcomes for one resource are merged.
    const fn severity(&self) -> u8 {
        match self {
            Self::Compiled { .. } => 0,
            Self::Disabled => 1,
            Self::Superseded { .. } => 2,
            Self::Failed(_) => 3,
            Self::Invalid(_) => 4,
        }
    }
}

/// Outcome for one source resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Resource the condition is written to.
    pub target: ObjectRef,
    /// Generation the outcome was computed from.
    pub generation: i64,
    /// Outcome.
    pub outcome: Outcome,
}

impl ActionOutcome {
    /// Creates an outcome.
    #[must_use]
    pub const fn new(target: ObjectRef, generation: i64, outcome: Outcome) -> Self {
        Self {
            target,
            generation,
            outcome,
        }
    }
}

/// Merges outcomes into one `TransformedToProcessor` condition per resource.
///
/// The most severe outcome decides the reason. Compiled outcomes list every
/// processor the resource reached.
#[must_use]
pub fn merge_outcomes(outcomes: &[ActionOutcome]) -> BTreeMap<ObjectRef, Condition> {
    let mut grouped: BTreeMap<&ObjectRef, Vec<&ActionOutcome>> = BTreeMap::new();
    for outcome in outcomes {
        grouped.entry(&outcome.target).or_default().push(outcome);
    }

    grouped
        .into_iter()
        .filter_map(|(target, group)| {
            let generation = group.iter().map(|o| o.generation).max().unwrap_or_default();
            let worst = group.iter().max_by_key(|o| o.outcome.severity())?;
            let condition = match &worst.outcome {
                Outcome::Compiled { .. } => {
                    let processors: BTreeSet<&str> = group
                        .iter()
                        .filter_map(|o| match &o.outcome {
                            Outcome::Compiled { processor } => Some(processor.as_str()),
                            _ => None,
                        })
                        .collect();
                    condition(
                        ConditionStatus::True,
                        Reason::ProcessorCreated,
                        format!(
                            "compiled into processor {}",
                            processors.into_iter().collect::<Vec<_>>().join(", ")
                        ),
                        generation,
                    )
                }
                Outcome::Invalid(message) => condition(
                    ConditionStatus::False,
                    Reason::InvalidConfig,
                    message.clone(),
                    generation,
                ),
                Outcome::Disabled => condition(
                    ConditionStatus::False,
                    Reason::ActionDisabled,
                    "action is disabled".to_string(),
                    generation,
                ),
                Outcome::Superseded { .. } => condition(
                    ConditionStatus::False,
                    Reason::MultipleSimilarActions,
                    MULTIPLE_SIMILAR_ACTIONS_MESSAGE.to_string(),
                    generation,
                ),
                Outcome::Failed(message) => condition(
                    ConditionStatus::False,
                    Reason::FailedToCreateProcessor,
                    message.clone(),
                    generation,
                ),
            };
            Some((target.clone(), condition))
        })
        .collect()
}

fn condition(
    status: ConditionStatus,
    reason: Reason,
    message: String,
    generation: i64,
) -> Condition {
    Condition::new(TRANSFORMED_TO_PROCESSOR, status, reason.as_str(), message, generation)
}

/// Writes one condition to a unified action or a legacy resource.
///
/// # Errors
///
/// Returns the store's error.
pub fn write_condition(
    store: &dyn ResourceStore,
    target: &ObjectRef,
    condition: Condition,
) -> Result<()> {
    if target.kind == ACTION_KIND {
        store.update_action_status(target, condition)
    } else {
        store.update_legacy_status(target, condition)
    }
}

/// Writes conditions best-effort.
///
/// Failures are logged and counted, never propagated, except cancellation
/// which stops the remaining writes.
pub fn write_conditions(
    store: &dyn ResourceStore,
    conditions: &BTreeMap<ObjectRef, Condition>,
) -> usize {
    let mut failures = 0;
    for (target, condition) in conditions {
        match write_condition(store, target, condition.clone()) {
            Ok(()) => debug!("{} -> {} {}", target, condition.status, condition.reason),
            Err(Error::Cancelled(namespace)) => {
                warn!("Status writes for namespace {} cancelled", namespace);
                return failures + 1;
            }
            Err(e) => {
                failures += 1;
                warn!("Failed to update status of {}: {}", target, e);
            }
        }
    }
    failures
}
