//! Conversion of legacy sampler resources into unified actions.
//!
//! Conversion is pure. Persisting the result (migration) is the compiler's
//! job, which uses [`migrated_name`] to keep it idempotent.

use crate::action::{Action, ActionSpec, LegacyAction, LegacyResource, SamplersConfig};
use crate::meta::{ObjectMeta, Status};
use crate::sampler::SamplerKind;

/// Label stamped on actions synthesized from a legacy resource.
///
/// The value is `<legacy kind slug>.<legacy name>`.
pub const MIGRATED_FROM_LABEL: &str = "sampling.io/migrated-from";

/// Deterministic name of the unified action migrated from a legacy resource.
///
/// The unified action lives in the legacy resource's namespace, so the pair
/// (namespace, name) identifies the counterpart.
#[must_use]
pub fn migrated_name(kind: SamplerKind, legacy_name: &str) -> String {
    format!("{}-{}", kind.slug(), legacy_name)
}

fn spec_from<C>(resource: &LegacyResource<C>, samplers: SamplersConfig) -> ActionSpec {
    ActionSpec {
        action_name: resource.spec.action_name.clone(),
        notes: resource.spec.notes.clone(),
        disabled: resource.spec.disabled,
        signals: resource.spec.signals.clone(),
        samplers: Some(samplers),
    }
}

/// Converts a legacy resource into the shape of the unified action.
///
/// Shared fields (`disabled`, `notes`, `signals`, `actionName`) are copied and
/// the legacy payload is wrapped into the matching `samplers` sub-field. The
/// result keeps the legacy resource's metadata and carries no status.
#[must_use]
pub fn legacy_to_unified(legacy: &LegacyAction) -> Action {
    let spec = match legacy {
        LegacyAction::Latency(r) => spec_from(
            r,
            SamplersConfig {
                latency_sampler: Some(r.spec.config.clone()),
                ..SamplersConfig::default()
            },
        ),
        LegacyAction::Error(r) => spec_from(
            r,
            SamplersConfig {
                error_sampler: Some(r.spec.config.clone()),
                ..SamplersConfig::default()
            },
        ),
        LegacyAction::Probabilistic(r) => spec_from(
            r,
            SamplersConfig {
                probabilistic_sampler: Some(r.spec.config.clone()),
                ..SamplersConfig::default()
            },
        ),
        LegacyAction::ServiceName(r) => spec_from(
            r,
            SamplersConfig {
                service_name_sampler: Some(r.spec.config.clone()),
                ..SamplersConfig::default()
            },
        ),
        LegacyAction::SpanAttribute(r) => spec_from(
            r,
            SamplersConfig {
                span_attribute_sampler: Some(r.spec.config.clone()),
                ..SamplersConfig::default()
            },
        ),
    };

    Action {
        metadata: legacy.metadata().clone(),
        spec,
        status: Status::default(),
    }
}

/// Builds the unified action to persist for a legacy resource.
///
/// Unlike [`legacy_to_unified`], the result gets fresh metadata: the
/// deterministic [`migrated_name`], no uid, and the [`MIGRATED_FROM_LABEL`].
#[must_use]
pub fn migrated_action(legacy: &LegacyAction) -> Action {
    let mut action = legacy_to_unified(legacy);
    let source = legacy.metadata();
    let kind = legacy.kind();

    action.metadata = ObjectMeta::new(&source.namespace, migrated_name(kind, &source.name))
        .with_label(
            MIGRATED_FROM_LABEL,
            format!("{}.{}", kind.slug(), source.name),
        );
    action
}
