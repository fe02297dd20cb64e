//! Resource store interface and an in-memory implementation.
//!
//! The store is the compiler's only I/O boundary. Reads happen first, then
//! one write phase; the store itself provides atomicity per call.

use crate::error::{Error, Result};
use crate::processor::{Processor, PROCESSOR_KIND};
use sampling_actions::{
    Action, Condition, LegacyAction, ManifestSet, ObjectRef, SamplerKind, ACTION_KIND,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use xxhash_rust::xxh64::xxh64;

const UID_SEED: u64 = 0x5549_4453; // "UIDS" in hex

/// Result of applying a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The processor did not exist and was created.
    Created,
    /// The processor existed and was patched.
    Configured,
    /// The stored processor already matched.
    Unchanged,
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Configured => write!(f, "configured"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Parameters of a processor apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyParams {
    /// Field-owner identity.
    pub field_manager: String,
    /// Take over objects owned by another manager.
    pub force: bool,
}

impl ApplyParams {
    /// Apply as `field_manager` without forcing.
    #[must_use]
    pub fn new(field_manager: impl Into<String>) -> Self {
        Self {
            field_manager: field_manager.into(),
            force: false,
        }
    }

    /// Take over conflicting ownership.
    #[must_use]
    pub const fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Storage for sampling resources and processors.
pub trait ResourceStore: Send + Sync {
    /// Namespaces holding at least one resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn namespaces(&self) -> Result<Vec<String>>;

    /// Unified actions in a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_actions(&self, namespace: &str) -> Result<Vec<Action>>;

    /// Legacy resources of one kind in a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_legacy(&self, namespace: &str, kind: SamplerKind) -> Result<Vec<LegacyAction>>;

    /// Creates a unified action. Fails with [`Error::AlreadyExists`] if the
    /// name is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the action exists or the store cannot be written.
    fn create_action(&self, action: Action) -> Result<Action>;

    /// Reads a processor.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_processor(&self, namespace: &str, name: &str) -> Result<Option<Processor>>;

    /// Creates or patches a processor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if another field manager owns the
    /// processor and `params.force` is false.
    fn apply_processor(&self, processor: &Processor, params: &ApplyParams) -> Result<ApplyOutcome>;

    /// Deletes a processor. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn delete_processor(&self, namespace: &str, name: &str) -> Result<bool>;

    /// Sets a condition on a unified action.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the action does not exist.
    fn update_action_status(&self, target: &ObjectRef, condition: Condition) -> Result<()>;

    /// Sets a condition on a legacy resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the resource does not exist.
    fn update_legacy_status(&self, target: &ObjectRef, condition: Condition) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredProcessor {
    processor: Processor,
    manager: String,
}

#[derive(Debug, Default)]
struct NamespaceState {
    actions: BTreeMap<String, Action>,
    legacy: BTreeMap<(SamplerKind, String), LegacyAction>,
    processors: BTreeMap<String, StoredProcessor>,
}

impl NamespaceState {
    fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.legacy.is_empty() && self.processors.is_empty()
    }
}

#[derive(Debug, Default)]
struct State {
    namespaces: BTreeMap<String, NamespaceState>,
    cancelled: BTreeSet<String>,
    fail_next_apply: Option<String>,
    version: u64,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn check(&self, namespace: &str) -> Result<()> {
        if self.cancelled.contains(namespace) {
            Err(Error::Cancelled(namespace.to_string()))
        } else {
            Ok(())
        }
    }
}

fn derive_uid(kind: &str, namespace: &str, name: &str) -> String {
    let hash = xxh64(format!("{kind}/{namespace}/{name}").as_bytes(), UID_SEED);
    format!("{hash:016x}")
}

fn not_found(target: &ObjectRef) -> Error {
    Error::NotFound {
        kind: target.kind.clone(),
        namespace: target.namespace.clone(),
        name: target.name.clone(),
    }
}

/// In-memory [`ResourceStore`].
///
/// Assigns deterministic uids, bumps `resourceVersion` only on real change,
/// tracks the field manager of every processor, and supports per-namespace
/// cancellation and fault injection for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with manifests.
    ///
    /// # Errors
    ///
    /// Returns an error if two manifests share kind, namespace and name.
    pub fn from_manifests(manifests: ManifestSet) -> Result<Self> {
        let store = Self::new();
        for action in manifests.actions {
            store.create_action(action)?;
        }
        for legacy in manifests.legacy {
            store.insert_legacy(legacy)?;
        }
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Unavailable("store lock poisoned".to_string()))
    }

    /// Adds a legacy resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if a resource of the same kind and
    /// name exists in the namespace.
    pub fn insert_legacy(&self, mut legacy: LegacyAction) -> Result<LegacyAction> {
        let mut state = self.lock()?;
        let target = legacy.object_ref();
        state.check(&target.namespace)?;

        let key = (legacy.kind(), target.name.clone());
        let exists = state
            .namespaces
            .get(&target.namespace)
            .is_some_and(|ns| ns.legacy.contains_key(&key));
        if exists {
            return Err(Error::AlreadyExists {
                kind: target.kind,
                namespace: target.namespace,
                name: target.name,
            });
        }

        let version = state.next_version();
        let meta = legacy.metadata_mut();
        if meta.uid.is_empty() {
            meta.uid = derive_uid(&target.kind, &target.namespace, &target.name);
        }
        meta.generation = meta.generation.max(1);
        meta.resource_version = Some(version);

        state
            .namespaces
            .entry(target.namespace)
            .or_default()
            .legacy
            .insert(key, legacy.clone());
        Ok(legacy)
    }

    /// Replaces every action and legacy resource of a namespace with the
    /// namespace's share of `manifests`. Processors are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace is cancelled or the manifests hold
    /// duplicates.
    pub fn replace_namespace(&self, namespace: &str, manifests: &ManifestSet) -> Result<()> {
        {
            let mut state = self.lock()?;
            state.check(namespace)?;
            if let Some(ns) = state.namespaces.get_mut(namespace) {
                ns.actions.clear();
                ns.legacy.clear();
            }
        }
        let manifests = manifests.in_namespace(namespace);
        debug!("Replacing namespace {} with {} resources", namespace, manifests.len());
        for action in manifests.actions {
            self.create_action(action)?;
        }
        for legacy in manifests.legacy {
            self.insert_legacy(legacy)?;
        }
        Ok(())
    }

    /// Replaces the spec of an existing unified action, bumping its generation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the action does not exist.
    pub fn update_action(&self, action: Action) -> Result<Action> {
        let mut state = self.lock()?;
        let target = action.object_ref();
        state.check(&target.namespace)?;
        let version = state.next_version();

        let stored = state
            .namespaces
            .get_mut(&target.namespace)
            .and_then(|ns| ns.actions.get_mut(&target.name))
            .ok_or_else(|| not_found(&target))?;
        if stored.spec != action.spec {
            stored.spec = action.spec;
            stored.metadata.generation += 1;
            stored.metadata.resource_version = Some(version);
        }
        Ok(stored.clone())
    }

    /// Reads a unified action.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn action(&self, namespace: &str, name: &str) -> Result<Option<Action>> {
        let state = self.lock()?;
        Ok(state
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.actions.get(name))
            .cloned())
    }

    /// Reads a legacy resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn legacy(
        &self,
        namespace: &str,
        kind: SamplerKind,
        name: &str,
    ) -> Result<Option<LegacyAction>> {
        let state = self.lock()?;
        Ok(state
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.legacy.get(&(kind, name.to_string())))
            .cloned())
    }

    /// Every processor in a namespace, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn processors(&self, namespace: &str) -> Result<Vec<Processor>> {
        let state = self.lock()?;
        Ok(state
            .namespaces
            .get(namespace)
            .map(|ns| ns.processors.values().map(|p| p.processor.clone()).collect())
            .unwrap_or_default())
    }

    /// Makes every subsequent call for `namespace` fail with [`Error::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn cancel_namespace(&self, namespace: &str) -> Result<()> {
        self.lock()?.cancelled.insert(namespace.to_string());
        Ok(())
    }

    /// Lifts a cancellation.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn resume_namespace(&self, namespace: &str) -> Result<()> {
        self.lock()?.cancelled.remove(namespace);
        Ok(())
    }

    /// Makes the next processor apply fail with [`Error::Unavailable`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn fail_next_apply(&self, reason: impl Into<String>) -> Result<()> {
        self.lock()?.fail_next_apply = Some(reason.into());
        Ok(())
    }
}

impl ResourceStore for MemoryStore {
    fn namespaces(&self) -> Result<Vec<String>> {
        let state = self.lock()?;
        Ok(state
            .namespaces
            .iter()
            .filter(|(_, ns)| !ns.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn list_actions(&self, namespace: &str) -> Result<Vec<Action>> {
        let state = self.lock()?;
        state.check(namespace)?;
        Ok(state
            .namespaces
            .get(namespace)
            .map(|ns| ns.actions.values().cloned().collect())
            .unwrap_or_default())
    }

    fn list_legacy(&self, namespace: &str, kind: SamplerKind) -> Result<Vec<LegacyAction>> {
        let state = self.lock()?;
        state.check(namespace)?;
        Ok(state
            .namespaces
            .get(namespace)
            .map(|ns| {
                ns.legacy
                    .iter()
                    .filter(|((k, _), _)| *k == kind)
                    .map(|(_, l)| l.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn create_action(&self, mut action: Action) -> Result<Action> {
        let mut state = self.lock()?;
        let target = action.object_ref();
        state.check(&target.namespace)?;

        let exists = state
            .namespaces
            .get(&target.namespace)
            .is_some_and(|ns| ns.actions.contains_key(&target.name));
        if exists {
            return Err(Error::AlreadyExists {
                kind: ACTION_KIND.to_string(),
                namespace: target.namespace,
                name: target.name,
            });
        }

        let version = state.next_version();
        if action.metadata.uid.is_empty() {
            action.metadata.uid = derive_uid(ACTION_KIND, &target.namespace, &target.name);
        }
        action.metadata.generation = action.metadata.generation.max(1);
        action.metadata.resource_version = Some(version);

        debug!("Created {}", target);
        state
            .namespaces
            .entry(target.namespace)
            .or_default()
            .actions
            .insert(target.name, action.clone());
        Ok(action)
    }

    fn get_processor(&self, namespace: &str, name: &str) -> Result<Option<Processor>> {
        let state = self.lock()?;
        state.check(namespace)?;
        Ok(state
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.processors.get(name))
            .map(|p| p.processor.clone()))
    }

    fn apply_processor(&self, processor: &Processor, params: &ApplyParams) -> Result<ApplyOutcome> {
        let mut state = self.lock()?;
        let namespace = processor.metadata.namespace.clone();
        let name = processor.name().to_string();
        state.check(&namespace)?;

        if let Some(reason) = state.fail_next_apply.take() {
            return Err(Error::Unavailable(reason));
        }

        let existing = state
            .namespaces
            .get(&namespace)
            .and_then(|ns| ns.processors.get(&name))
            .cloned();

        let (outcome, mut stored) = match existing {
            Some(current) => {
                if current.manager != params.field_manager && !params.force {
                    return Err(Error::Conflict {
                        name,
                        owner: current.manager,
                        manager: params.field_manager.clone(),
                    });
                }
                if current.processor.same_desired_state(processor)
                    && current.manager == params.field_manager
                {
                    return Ok(ApplyOutcome::Unchanged);
                }
                let mut next = processor.clone();
                next.metadata.uid = current.processor.metadata.uid.clone();
                next.metadata.generation = if current.processor.spec == processor.spec {
                    current.processor.metadata.generation
                } else {
                    current.processor.metadata.generation + 1
                };
                (ApplyOutcome::Configured, next)
            }
            None => {
                let mut next = processor.clone();
                next.metadata.uid = derive_uid(PROCESSOR_KIND, &namespace, &name);
                next.metadata.generation = 1;
                (ApplyOutcome::Created, next)
            }
        };

        stored.metadata.resource_version = Some(state.next_version());
        state.namespaces.entry(namespace).or_default().processors.insert(
            name,
            StoredProcessor {
                processor: stored,
                manager: params.field_manager.clone(),
            },
        );
        Ok(outcome)
    }

    fn delete_processor(&self, namespace: &str, name: &str) -> Result<bool> {
        let mut state = self.lock()?;
        state.check(namespace)?;
        Ok(state
            .namespaces
            .get_mut(namespace)
            .and_then(|ns| ns.processors.remove(name))
            .is_some())
    }

    fn update_action_status(&self, target: &ObjectRef, condition: Condition) -> Result<()> {
        let mut state = self.lock()?;
        state.check(&target.namespace)?;
        let version = state.next_version();
        let action = state
            .namespaces
            .get_mut(&target.namespace)
            .and_then(|ns| ns.actions.get_mut(&target.name))
            .ok_or_else(|| not_found(target))?;
        if action.status.set_condition(condition) {
            action.metadata.resource_version = Some(version);
        }
        Ok(())
    }

    fn update_legacy_status(&self, target: &ObjectRef, condition: Condition) -> Result<()> {
        let kind = SamplerKind::from_legacy_kind(&target.kind).ok_or_else(|| not_found(target))?;
        let mut state = self.lock()?;
        state.check(&target.namespace)?;
        let version = state.next_version();
        let legacy = state
            .namespaces
            .get_mut(&target.namespace)
            .and_then(|ns| ns.legacy.get_mut(&(kind, target.name.clone())))
            .ok_or_else(|| not_found(target))?;
        if legacy.status_mut().set_condition(condition) {
            legacy.metadata_mut().resource_version = Some(version);
        }
        Ok(())
    }
}
