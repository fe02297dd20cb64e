//! One-time migration of legacy sampler resources into unified actions.
//!
//! Migration is synthesize-if-absent keyed by the deterministic
//! [`migrated_name`]: re-running it over the same namespace creates nothing.
//! Legacy resources are never deleted; they get a `Migrated` condition
//! pointing at their counterpart.

use crate::error::{Error, Result};
use crate::handlers::ActionSet;
use crate::status::{self, Reason, MIGRATED};
use crate::store::ResourceStore;
use sampling_actions::{
    migrated_action, migrated_name, Action, Condition, ConditionStatus, LegacyAction, ObjectRef,
    ACTION_KIND,
};
use tracing::{debug, info, warn};

/// Result of migrating one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Unified actions created by this run.
    pub created: Vec<ObjectRef>,
    /// Counterparts that already existed.
    pub existing: Vec<ObjectRef>,
}

impl MigrationReport {
    /// Returns true if nothing was created.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
    }
}

/// Unified actions that a migration of `actions` would create.
#[must_use]
pub fn pending_migrations(actions: &ActionSet) -> Vec<Action> {
    actions
        .legacy()
        .iter()
        .filter(|l| !actions.has_migrated(l))
        .map(migrated_action)
        .collect()
}

fn counterpart(legacy: &LegacyAction) -> ObjectRef {
    let meta = legacy.metadata();
    ObjectRef::new(
        ACTION_KIND,
        &meta.namespace,
        migrated_name(legacy.kind(), &meta.name),
    )
}

fn migrated_condition(legacy: &LegacyAction, target: &ObjectRef) -> Condition {
    Condition::new(
        MIGRATED,
        ConditionStatus::True,
        Reason::MigratedToAction.as_str(),
        format!("migrated to {}/{}", target.kind, target.name),
        legacy.metadata().generation,
    )
}

/// Creates the unified counterpart of every legacy resource in a namespace.
///
/// # Errors
///
/// Returns the store's error if reading or creating fails. Back-reference
/// conditions on legacy resources are best-effort.
pub fn migrate_namespace(store: &dyn ResourceStore, namespace: &str) -> Result<MigrationReport> {
    let actions = ActionSet::load(store, namespace)?;
    let mut report = MigrationReport::default();

    for legacy in actions.legacy() {
        let target = counterpart(legacy);
        if actions.has_migrated(legacy) {
            report.existing.push(target.clone());
        } else {
            match store.create_action(migrated_action(legacy)) {
                Ok(created) => {
                    info!("Migrated {} to {}", legacy.object_ref(), created.object_ref());
                    report.created.push(target.clone());
                }
                Err(Error::AlreadyExists { .. }) => {
                    debug!("{} already exists", target);
                    report.existing.push(target.clone());
                }
                Err(e) => return Err(e),
            }
        }

        let condition = migrated_condition(legacy, &target);
        if let Err(e) = status::write_condition(store, &legacy.object_ref(), condition) {
            if matches!(e, Error::Cancelled(_)) {
                return Err(e);
            }
            warn!("Failed to mark {} as migrated: {}", legacy.object_ref(), e);
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixtures::{legacy_error, legacy_probabilistic};
    use crate::store::MemoryStore;
    use sampling_actions::{SamplerKind, MIGRATED_FROM_LABEL};

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        for legacy in [
            legacy_error("a", 10.0),
            legacy_error("b", 20.0),
            legacy_probabilistic("tenth", "10"),
        ] {
            store.insert_legacy(legacy).unwrap();
        }
        store
    }

    #[test]
    fn creates_one_action_per_legacy_resource() {
        let store = store();
        let report = migrate_namespace(&store, "shop").unwrap();
        assert_eq!(report.created.len(), 3);

        let action = store.action("shop", "errorsampler-a").unwrap().unwrap();
        assert_eq!(
            action.metadata.labels.get(MIGRATED_FROM_LABEL).map(String::as_str),
            Some("errorsampler.a")
        );
        assert!(!action.metadata.uid.is_empty());
    }

    #[test]
    fn second_run_is_a_noop() {
        let store = store();
        migrate_namespace(&store, "shop").unwrap();
        let before = store.list_actions("shop").unwrap();

        let report = migrate_namespace(&store, "shop").unwrap();
        assert!(report.is_noop());
        assert_eq!(report.existing.len(), 3);
        assert_eq!(store.list_actions("shop").unwrap(), before);
    }

    #[test]
    fn rerun_keeps_edits_to_migrated_actions() {
        let store = store();
        migrate_namespace(&store, "shop").unwrap();

        let mut edited = store.action("shop", "errorsampler-a").unwrap().unwrap();
        edited
            .spec
            .samplers
            .as_mut()
            .unwrap()
            .error_sampler
            .as_mut()
            .unwrap()
            .fallback_sampling_ratio = 50.0;
        let edited = store.update_action(edited).unwrap();
        assert_eq!(edited.metadata.generation, 2);

        let report = migrate_namespace(&store, "shop").unwrap();
        assert!(report.is_noop());
        let stored = store.action("shop", "errorsampler-a").unwrap().unwrap();
        assert_eq!(stored.spec, edited.spec);
        assert_eq!(stored.metadata.generation, 2);
    }

    #[test]
    fn legacy_resources_get_a_back_reference() {
        let store = store();
        migrate_namespace(&store, "shop").unwrap();

        let legacy = store.legacy("shop", SamplerKind::Error, "a").unwrap().unwrap();
        let condition = legacy.status().condition(MIGRATED).unwrap();
        assert!(condition.is_true());
        assert_eq!(condition.reason, "MigratedToAction");
        assert_eq!(condition.message, "migrated to Action/errorsampler-a");
    }

    #[test]
    fn pending_migrations_skip_migrated_resources() {
        let store = store();
        let before = ActionSet::load(&store, "shop").unwrap();
        assert_eq!(pending_migrations(&before).len(), 3);

        migrate_namespace(&store, "shop").unwrap();
        let after = ActionSet::load(&store, "shop").unwrap();
        assert!(pending_migrations(&after).is_empty());
    }

    #[test]
    fn cancelled_namespace_aborts() {
        let store = store();
        store.cancel_namespace("shop").unwrap();
        assert!(matches!(
            migrate_namespace(&store, "shop"),
            Err(Error::Cancelled(_))
        ));
    }
}
