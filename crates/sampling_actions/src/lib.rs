//! Sampling action resources for the sampling compiler.
//!
//! This crate provides:
//! - The unified `Action` resource and the five legacy sampler kinds
//! - Sampler payload types with their `validate()` contracts
//! - Pure legacy → unified conversion
//! - Manifest loading (multi-document YAML/JSON) and JSON schemas
//!
//! # Example
//!
//! ```rust,ignore
//! use sampling_actions::{legacy_to_unified, ManifestSet};
//!
//! let set = ManifestSet::load_path("manifests/", "default")?;
//! for legacy in &set.legacy {
//!     let action = legacy_to_unified(legacy);
//!     assert!(action.samplers().is_some());
//! }
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod action;
pub mod convert;
pub mod error;
pub mod manifest;
pub mod meta;
pub mod sampler;

pub use action::{
    Action, ActionSpec, LegacyAction, LegacyResource, LegacySpec, SamplersConfig, ACTION_KIND,
};
pub use convert::{legacy_to_unified, migrated_action, migrated_name, MIGRATED_FROM_LABEL};
pub use error::{Error, Result, ValidationError};
pub use manifest::{resource_schemas, Manifest, ManifestSet, DEFAULT_NAMESPACE};
pub use meta::{Condition, ConditionStatus, ObjectMeta, ObjectRef, OwnerReference, Signal, Status};
pub use sampler::{SamplerKind, TypedCondition};
