//! Sampling action compiler.
//!
//! Turns the sampling resources of a namespace into at most three collector
//! processors:
//! - `sampling-rules`: the union of every error, service-name, span-attribute
//!   and (by default) latency rule
//! - `tail-sampling`: one winning policy per policy type
//! - `probabilistic-sampler`: the head sampler used when only probabilistic
//!   policies exist
//!
//! Compilation is deterministic: the same snapshot always yields
//! byte-identical processor documents.
//!
//! # Example
//!
//! ```rust,ignore
//! use sampling_compiler::{CompilerConfig, MemoryStore, Reconciler};
//!
//! let store = MemoryStore::from_manifests(manifests)?;
//! let reconciler = Reconciler::new(&store, CompilerConfig::default());
//! let report = reconciler.reconcile("default")?;
//! println!("{}", sampling_compiler::generate_report(&report));
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::format_push_string)]
#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod policy;
pub mod processor;
pub mod reconciler;
pub mod report;
pub mod rule_engine;
pub mod rules;
pub mod status;
pub mod store;
pub mod tail_engine;

pub use config::{CompilerConfig, LatencyEngine, DEFAULT_FIELD_MANAGER};
pub use error::{Error, Result};
pub use handlers::ActionSet;
pub use migration::{migrate_namespace, pending_migrations, MigrationReport};
pub use policy::{Policy, PolicyDetails, PolicyType, TailSamplingConfig};
pub use processor::{
    config_hash, CollectorRole, Processor, ProcessorEmitter, ProcessorSpec, ProcessorTemplate,
    GLOBAL_SAMPLING, PROBABILISTIC_SAMPLER, TAIL_SAMPLING, TEMPLATES,
};
pub use reconciler::{Plan, ReconcileReport, Reconciler};
pub use report::generate_report;
pub use rule_engine::{RuleCompilation, RuleEngine};
pub use rules::{Rule, RuleDetails, RuleScope, RuleType, SamplingRulesConfig};
pub use status::{merge_outcomes, ActionOutcome, Outcome, TRANSFORMED_TO_PROCESSOR};
pub use store::{ApplyOutcome, ApplyParams, MemoryStore, ResourceStore};
pub use tail_engine::{TailCompilation, TailEngine, TailTopology};
