//! Per-namespace reconciliation.
//!
//! One cycle is a full recompute: migrate legacy resources, snapshot the
//! namespace, run both engines, converge the processors, then write status
//! conditions. Nothing is cached between cycles, so namespaces can be
//! reconciled concurrently against the same store.

use crate::config::CompilerConfig;
use crate::error::{Error, Result};
use crate::handlers::ActionSet;
use crate::migration::{migrate_namespace, MigrationReport};
use crate::processor::{Processor, ProcessorEmitter, GLOBAL_SAMPLING};
use crate::rule_engine::{Contributor, RuleCompilation, RuleEngine};
use crate::status::{merge_outcomes, write_conditions, ActionOutcome, Outcome};
use crate::store::{ApplyOutcome, ApplyParams, ResourceStore};
use crate::tail_engine::{TailCompilation, TailEngine, TailTopology};
use sampling_actions::{Condition, ObjectRef};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

/// A processor that should exist, with the resources that fed it.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredProcessor {
    /// Processor document.
    pub processor: Processor,
    /// Resources whose configuration is in the document.
    pub contributors: Vec<Contributor>,
}

/// Everything one cycle intends to write, computed without touching the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Namespace of the plan.
    pub namespace: String,
    /// Rule engine output.
    pub rules: RuleCompilation,
    /// Tail engine output.
    pub tail: TailCompilation,
    /// Processors to create or patch, in converge order.
    pub desired: Vec<DesiredProcessor>,
    /// Names of processors to delete.
    pub stale: Vec<&'static str>,
    /// Disabled, invalid and superseded resources.
    pub outcomes: Vec<ActionOutcome>,
}

/// A converged processor.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedProcessor {
    /// Document as applied.
    pub processor: Processor,
    /// What the store did with it.
    pub outcome: ApplyOutcome,
}

/// Result of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    /// Namespace.
    pub namespace: String,
    /// Legacy resources migrated during this cycle.
    pub migration: MigrationReport,
    /// Tail-sampling topology.
    pub topology: TailTopology,
    /// Converged processors.
    pub applied: Vec<AppliedProcessor>,
    /// Processors deleted during this cycle.
    pub deleted: Vec<String>,
    /// Condition computed for every touched resource.
    pub conditions: BTreeMap<ObjectRef, Condition>,
    /// Status writes that failed.
    pub status_failures: usize,
}

impl ReconcileReport {
    /// Returns true if the cycle changed any stored object besides statuses.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.migration.is_noop()
            || !self.deleted.is_empty()
            || self
                .applied
                .iter()
                .any(|a| a.outcome != ApplyOutcome::Unchanged)
    }
}

/// Reconciles namespaces of one store.
pub struct Reconciler<'s> {
    store: &'s dyn ResourceStore,
    config: CompilerConfig,
    rules: RuleEngine,
    tail: TailEngine,
}

impl<'s> Reconciler<'s> {
    /// Creates a reconciler with the standard handler registry.
    #[must_use]
    pub fn new(store: &'s dyn ResourceStore, config: CompilerConfig) -> Self {
        Self {
            store,
            rules: RuleEngine::with_registry(config.latency_engine),
            tail: TailEngine::with_registry(config.latency_engine),
            config,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Computes the desired processors of a snapshot.
    ///
    /// A resource that fails validation in either engine is excluded from
    /// both.
    ///
    /// # Errors
    ///
    /// Returns an error if a processor config cannot be serialized.
    pub fn plan(&self, actions: &ActionSet) -> Result<Plan> {
        let namespace = actions.namespace();
        let rule_inputs = self.rules.collect(actions);
        let tail_inputs = self.tail.collect(actions);

        let mut excluded = rule_inputs.invalid_sources();
        excluded.extend(tail_inputs.invalid_sources());

        let rules = self.rules.compile(&rule_inputs, &excluded);
        let tail = self.tail.compile(&tail_inputs, &excluded);

        let mut desired = Vec::new();
        let mut stale = Vec::new();
        match rules.processor(namespace)? {
            Some(processor) => desired.push(DesiredProcessor {
                processor,
                contributors: rules.contributors.clone(),
            }),
            None => stale.push(GLOBAL_SAMPLING.name),
        }
        if let Some(processor) = tail.processor(namespace)? {
            desired.push(DesiredProcessor {
                processor,
                contributors: tail.contributors(),
            });
        }
        stale.extend(tail.stale_templates().iter().map(|t| t.name));

        let mut outcomes = rule_inputs.outcomes;
        outcomes.extend(tail_inputs.outcomes);
        outcomes.extend(tail.outcomes.iter().cloned());

        Ok(Plan {
            namespace: namespace.to_string(),
            rules,
            tail,
            desired,
            stale,
            outcomes,
        })
    }

    /// Runs one full cycle for a namespace.
    ///
    /// # Errors
    ///
    /// Returns the first store error. When a processor cannot be written, its
    /// contributors are marked `FailedToCreateProcessor` before returning.
    pub fn reconcile(&self, namespace: &str) -> Result<ReconcileReport> {
        let migration = if self.config.migrate_legacy {
            migrate_namespace(self.store, namespace)?
        } else {
            MigrationReport::default()
        };

        let actions = ActionSet::load(self.store, namespace)?;
        let plan = self.plan(&actions)?;
        let emitter = ProcessorEmitter::new(
            self.store,
            ApplyParams::new(self.config.field_manager.as_str()),
        );

        let mut outcomes = plan.outcomes.clone();
        let mut applied = Vec::new();
        for desired in &plan.desired {
            let name = desired.processor.name().to_string();
            match emitter.converge(&desired.processor) {
                Ok(outcome) => {
                    let compiled = Outcome::Compiled { processor: name };
                    outcomes.extend(contributor_outcomes(desired, &compiled));
                    applied.push(AppliedProcessor {
                        processor: desired.processor.clone(),
                        outcome,
                    });
                }
                Err(e) => {
                    error!("Failed to apply processor {}/{}: {}", namespace, name, e);
                    if !matches!(e, Error::Cancelled(_)) {
                        let message = format!("failed to create processor {name}: {e}");
                        outcomes.extend(contributor_outcomes(desired, &Outcome::Failed(message)));
                        write_conditions(self.store, &merge_outcomes(&outcomes));
                    }
                    return Err(e);
                }
            }
        }

        let mut deleted = Vec::new();
        for name in &plan.stale {
            if emitter.remove(namespace, name)? {
                deleted.push((*name).to_string());
            }
        }

        let conditions = merge_outcomes(&outcomes);
        let status_failures = write_conditions(self.store, &conditions);
        if status_failures > 0 {
            warn!(
                "{} status updates failed in namespace {}",
                status_failures, namespace
            );
        }

        info!(
            "Reconciled namespace {}: {} processors, {} deleted, {} resources",
            namespace,
            applied.len(),
            deleted.len(),
            conditions.len()
        );

        Ok(ReconcileReport {
            namespace: namespace.to_string(),
            migration,
            topology: plan.tail.topology,
            applied,
            deleted,
            conditions,
            status_failures,
        })
    }

    /// Reconciles every namespace of the store, one thread per namespace.
    ///
    /// A failing namespace does not stop the others.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespaces cannot be listed.
    pub fn reconcile_all(&self) -> Result<BTreeMap<String, Result<ReconcileReport>>> {
        let namespaces = self.store.namespaces()?;
        let results: BTreeMap<_, _> = std::thread::scope(|scope| {
            let handles: Vec<_> = namespaces
                .iter()
                .map(|namespace| (namespace, scope.spawn(move || self.reconcile(namespace))))
                .collect();
            handles
                .into_iter()
                .map(|(namespace, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(Error::Unavailable(format!(
                            "reconciliation of namespace {namespace} panicked"
                        )))
                    });
                    (namespace.clone(), result)
                })
                .collect()
        });
        Ok(results)
    }
}

fn contributor_outcomes(desired: &DesiredProcessor, outcome: &Outcome) -> Vec<ActionOutcome> {
    desired
        .contributors
        .iter()
        .map(|c| ActionOutcome::new(c.target.clone(), c.generation, outcome.clone()))
        .collect()
}
