//! Processor documents and the emitter that converges them into the store.
//!
//! Three processors can exist per namespace, each with a fixed name so that
//! recompilation patches (or deletes) the previous artifact instead of
//! piling up new ones.

use crate::error::Result;
use crate::store::{ApplyOutcome, ApplyParams, ResourceStore};
use sampling_actions::{ObjectMeta, OwnerReference, Signal};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};
use xxhash_rust::xxh64::xxh64;

/// Kind name of processor documents.
pub const PROCESSOR_KIND: &str = "Processor";

/// Annotation holding the xxh64 fingerprint of a processor's config.
pub const CONFIG_HASH_ANNOTATION: &str = "sampling.io/config-hash";

/// Seed for xxhash to ensure deterministic hashing.
const HASH_SEED: u64 = 0x5341_4D50_4C45; // "SAMPLE" in hex

/// Collector tier a processor is deployed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectorRole {
    /// Central gateway that sees whole traces.
    ClusterGateway,
    /// Per-node agent.
    NodeCollector,
}

impl fmt::Display for CollectorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClusterGateway => write!(f, "CLUSTER_GATEWAY"),
            Self::NodeCollector => write!(f, "NODE_COLLECTOR"),
        }
    }
}

/// Fixed identity and placement of one processor artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorTemplate {
    /// Object name, also used as `processorName`.
    pub name: &'static str,
    /// Collector component type.
    pub processor_type: &'static str,
    /// Position within the collector pipeline.
    pub order_hint: i32,
    /// Collector tiers.
    pub collector_roles: &'static [CollectorRole],
}

/// Global sampling processor fed by the rule engine.
pub const GLOBAL_SAMPLING: ProcessorTemplate = ProcessorTemplate {
    name: "sampling-rules",
    processor_type: "odigossampling",
    order_hint: -24,
    collector_roles: &[CollectorRole::ClusterGateway],
};

/// Tail-sampling processor fed by the policy engine.
pub const TAIL_SAMPLING: ProcessorTemplate = ProcessorTemplate {
    name: "tail-sampling",
    processor_type: "tail_sampling",
    order_hint: -25,
    collector_roles: &[CollectorRole::ClusterGateway],
};

/// Head probabilistic sampler, used when only probabilistic policies exist.
pub const PROBABILISTIC_SAMPLER: ProcessorTemplate = ProcessorTemplate {
    name: "probabilistic-sampler",
    processor_type: "probabilistic_sampler",
    order_hint: 1,
    collector_roles: &[CollectorRole::NodeCollector],
};

/// Every template, in converge order.
pub const TEMPLATES: [ProcessorTemplate; 3] = [GLOBAL_SAMPLING, TAIL_SAMPLING, PROBABILISTIC_SAMPLER];

/// Desired state of a processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorSpec {
    /// Collector component type.
    #[serde(rename = "type")]
    pub processor_type: String,
    /// Display name.
    pub processor_name: String,
    /// Disabled processors are not deployed.
    pub disabled: bool,
    /// Signals the processor handles.
    pub signals: Vec<Signal>,
    /// Collector tiers.
    pub collector_roles: Vec<CollectorRole>,
    /// Position within the collector pipeline.
    pub order_hint: i32,
    /// Opaque component configuration.
    pub config: Value,
}

/// A processor document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Processor {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    pub spec: ProcessorSpec,
}

impl Processor {
    /// Builds a processor from a template.
    ///
    /// Owner references are sorted and deduplicated by uid, and the config
    /// fingerprint is stamped into [`CONFIG_HASH_ANNOTATION`].
    #[must_use]
    pub fn from_template(
        template: &ProcessorTemplate,
        namespace: &str,
        config: Value,
        owners: impl IntoIterator<Item = OwnerReference>,
    ) -> Self {
        let owners: BTreeMap<String, OwnerReference> =
            owners.into_iter().map(|o| (o.uid.clone(), o)).collect();

        let mut metadata = ObjectMeta::new(namespace, template.name);
        metadata.owner_references = owners.into_values().collect();
        metadata
            .annotations
            .insert(CONFIG_HASH_ANNOTATION.to_string(), config_hash(&config));

        Self {
            metadata,
            spec: ProcessorSpec {
                processor_type: template.processor_type.to_string(),
                processor_name: template.name.to_string(),
                disabled: false,
                signals: vec![Signal::Traces],
                collector_roles: template.collector_roles.to_vec(),
                order_hint: template.order_hint,
                config,
            },
        }
    }

    /// Name of the processor.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Owner references.
    #[must_use]
    pub fn owners(&self) -> &[OwnerReference] {
        &self.metadata.owner_references
    }

    /// Returns true if desired state (spec, owners, annotations) matches `other`.
    #[must_use]
    pub fn same_desired_state(&self, other: &Self) -> bool {
        self.spec == other.spec
            && self.metadata.owner_references == other.metadata.owner_references
            && self.metadata.annotations == other.metadata.annotations
    }
}

/// Computes the deterministic fingerprint of a processor config.
#[must_use]
pub fn config_hash(config: &Value) -> String {
    let hash = xxh64(config.to_string().as_bytes(), HASH_SEED);
    format!("{hash:016x}")
}

/// Converges processors into the store with a fixed field-owner identity.
///
/// This is the only component that mutates processors.
pub struct ProcessorEmitter<'a> {
    store: &'a dyn ResourceStore,
    params: ApplyParams,
}

impl<'a> ProcessorEmitter<'a> {
    /// Creates an emitter applying as `params.field_manager`.
    #[must_use]
    pub fn new(store: &'a dyn ResourceStore, params: ApplyParams) -> Self {
        Self { store, params }
    }

    /// Creates or patches a processor. Unchanged input is a storage no-op.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the apply fails.
    pub fn converge(&self, processor: &Processor) -> Result<ApplyOutcome> {
        let outcome = self.store.apply_processor(processor, &self.params)?;
        match outcome {
            ApplyOutcome::Unchanged => debug!(
                "Processor {}/{} unchanged",
                processor.metadata.namespace,
                processor.name()
            ),
            _ => info!(
                "Processor {}/{} {} ({} owners)",
                processor.metadata.namespace,
                processor.name(),
                outcome,
                processor.owners().len()
            ),
        }
        Ok(outcome)
    }

    /// Deletes a processor if it exists.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the delete fails.
    pub fn remove(&self, namespace: &str, name: &str) -> Result<bool> {
        let deleted = self.store.delete_processor(namespace, name)?;
        if deleted {
            info!("Processor {}/{} deleted", namespace, name);
        }
        Ok(deleted)
    }
}
