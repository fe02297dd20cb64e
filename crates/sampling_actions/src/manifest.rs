//! Manifest loading from files and directories.
//!
//! Manifests are YAML (or JSON) documents in the Kubernetes resource shape,
//! discriminated by their `kind` field. A file may hold several `---`
//! separated documents or a single top-level list.

use crate::action::{Action, LegacyAction, ACTION_KIND};
use crate::error::{Error, Result};
use crate::sampler::SamplerKind;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Namespace assigned to manifests that do not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// A single decoded resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    /// Unified action.
    Action(Action),
    /// Legacy sampler.
    Legacy(LegacyAction),
}

impl Manifest {
    /// Namespace of the resource.
    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Action(a) => &a.metadata.namespace,
            Self::Legacy(l) => &l.metadata().namespace,
        }
    }

    fn set_default_namespace(&mut self, namespace: &str) {
        let meta = match self {
            Self::Action(a) => &mut a.metadata,
            Self::Legacy(l) => l.metadata_mut(),
        };
        if meta.namespace.is_empty() {
            meta.namespace = namespace.to_string();
        }
    }
}

/// Decodes one resource value by its `kind`.
///
/// # Errors
///
/// Returns [`Error::UnsupportedKind`] for kinds this crate does not model and
/// a parse error if the value does not match the kind's shape.
pub fn decode(value: Value, document: usize) -> Result<Manifest> {
    let kind = value
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse {
            document,
            reason: "missing 'kind'".to_string(),
        })?
        .to_string();

    let parse_err = |e: serde_yaml::Error| Error::Parse {
        document,
        reason: format!("{kind}: {e}"),
    };

    if kind == ACTION_KIND {
        return serde_yaml::from_value(value).map(Manifest::Action).map_err(parse_err);
    }

    let legacy = match SamplerKind::from_legacy_kind(&kind) {
        Some(SamplerKind::Latency) => serde_yaml::from_value(value).map(LegacyAction::Latency),
        Some(SamplerKind::Error) => serde_yaml::from_value(value).map(LegacyAction::Error),
        Some(SamplerKind::Probabilistic) => {
            serde_yaml::from_value(value).map(LegacyAction::Probabilistic)
        }
        Some(SamplerKind::ServiceName) => {
            serde_yaml::from_value(value).map(LegacyAction::ServiceName)
        }
        Some(SamplerKind::SpanAttribute) => {
            serde_yaml::from_value(value).map(LegacyAction::SpanAttribute)
        }
        None => return Err(Error::UnsupportedKind(kind.clone())),
    };
    legacy.map(Manifest::Legacy).map_err(parse_err)
}

/// All sampling resources read from a set of manifests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestSet {
    /// Unified actions.
    pub actions: Vec<Action>,
    /// Legacy sampler resources.
    pub legacy: Vec<LegacyAction>,
}

impl ManifestSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource.
    pub fn push(&mut self, manifest: Manifest) {
        match manifest {
            Manifest::Action(a) => self.actions.push(a),
            Manifest::Legacy(l) => self.legacy.push(l),
        }
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len() + self.legacy.len()
    }

    /// Returns true if the set holds no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Namespaces that hold at least one resource.
    #[must_use]
    pub fn namespaces(&self) -> BTreeSet<String> {
        self.actions
            .iter()
            .map(|a| a.metadata.namespace.clone())
            .chain(self.legacy.iter().map(|l| l.metadata().namespace.clone()))
            .collect()
    }

    /// Resources of one namespace.
    #[must_use]
    pub fn in_namespace(&self, namespace: &str) -> Self {
        Self {
            actions: self
                .actions
                .iter()
                .filter(|a| a.metadata.namespace == namespace)
                .cloned()
                .collect(),
            legacy: self
                .legacy
                .iter()
                .filter(|l| l.metadata().namespace == namespace)
                .cloned()
                .collect(),
        }
    }

    /// Parses resources from a string.
    ///
    /// Documents with an unsupported `kind` are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if a document is not valid YAML or does not match
    /// the shape of its kind.
    pub fn parse_str(input: &str, default_namespace: &str) -> Result<Self> {
        let mut set = Self::new();
        let mut index = 0;

        for document in serde_yaml::Deserializer::from_str(input) {
            let value = Value::deserialize(document).map_err(|e| Error::Parse {
                document: index,
                reason: e.to_string(),
            })?;

            let values = match value {
                Value::Null => Vec::new(),
                Value::Sequence(items) => items,
                other => vec![other],
            };

            for value in values {
                match decode(value, index) {
                    Ok(mut manifest) => {
                        manifest.set_default_namespace(default_namespace);
                        set.push(manifest);
                    }
                    Err(Error::UnsupportedKind(kind)) => {
                        warn!("Skipping document {} with unsupported kind '{}'", index, kind);
                    }
                    Err(e) => return Err(e),
                }
                index += 1;
            }
        }

        Ok(set)
    }

    /// Loads resources from a file, or from every `.yaml`/`.yml`/`.json`
    /// file directly inside a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed.
    pub fn load_path(path: impl AsRef<Path>, default_namespace: &str) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            let content = std::fs::read_to_string(path)?;
            let set = Self::parse_str(&content, default_namespace)?;
            debug!("Loaded {} resources from {}", set.len(), path.display());
            return Ok(set);
        }

        let mut files: Vec<_> = std::fs::read_dir(path)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| matches!(e, "yaml" | "yml" | "json"))
            })
            .collect();
        files.sort();

        let mut set = Self::new();
        for file in &files {
            let loaded = Self::load_path(file, default_namespace)?;
            set.actions.extend(loaded.actions);
            set.legacy.extend(loaded.legacy);
        }

        info!(
            "Loaded {} resources from {} files in {}",
            set.len(),
            files.len(),
            path.display()
        );
        Ok(set)
    }
}

/// JSON schemas of the input resource kinds, keyed by kind name.
#[must_use]
pub fn resource_schemas() -> BTreeMap<&'static str, RootSchema> {
    use crate::action::LegacyResource;
    use crate::sampler::{
        ErrorSamplerConfig, LatencySamplerConfig, ProbabilisticSamplerConfig,
        ServiceNameSamplerConfig, SpanAttributeSamplerConfig,
    };

    let mut schemas = BTreeMap::new();
    schemas.insert(ACTION_KIND, schemars::schema_for!(Action));
    schemas.insert(
        SamplerKind::Latency.legacy_kind(),
        schemars::schema_for!(LegacyResource<LatencySamplerConfig>),
    );
    schemas.insert(
        SamplerKind::Error.legacy_kind(),
        schemars::schema_for!(LegacyResource<ErrorSamplerConfig>),
    );
    schemas.insert(
        SamplerKind::Probabilistic.legacy_kind(),
        schemars::schema_for!(LegacyResource<ProbabilisticSamplerConfig>),
    );
    schemas.insert(
        SamplerKind::ServiceName.legacy_kind(),
        schemars::schema_for!(LegacyResource<ServiceNameSamplerConfig>),
    );
    schemas.insert(
        SamplerKind::SpanAttribute.legacy_kind(),
        schemars::schema_for!(LegacyResource<SpanAttributeSamplerConfig>),
    );
    schemas
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFESTS: &str = r#"
apiVersion: actions.sampling.io/v1alpha1
kind: ErrorSampler
metadata:
  name: errors
  namespace: shop
spec:
  signals: [TRACES]
  fallback_sampling_ratio: 10
---
apiVersion: sampling.io/v1alpha1
kind: Action
metadata:
  name: cart-ratio
spec:
  signals: [TRACES]
  samplers:
    serviceNameSampler:
      services_name_filters:
        - service_name: cart
          sampling_ratio: 50
          fallback_sampling_ratio: 5
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: unrelated
"#;

    #[test]
    fn parses_multi_document_manifests() {
        let set = ManifestSet::parse_str(MANIFESTS, DEFAULT_NAMESPACE).unwrap();
        assert_eq!(set.actions.len(), 1);
        assert_eq!(set.legacy.len(), 1);
        assert_eq!(set.legacy[0].kind(), SamplerKind::Error);
    }

    #[test]
    fn missing_namespace_gets_default() {
        let set = ManifestSet::parse_str(MANIFESTS, "staging").unwrap();
        assert_eq!(set.actions[0].metadata.namespace, "staging");
        assert_eq!(set.legacy[0].metadata().namespace, "shop");
        let namespaces: Vec<_> = set.namespaces().into_iter().collect();
        assert_eq!(namespaces, vec!["shop".to_string(), "staging".to_string()]);
    }

    #[test]
    fn in_namespace_filters_both_eras() {
        let set = ManifestSet::parse_str(MANIFESTS, "staging").unwrap();
        let shop = set.in_namespace("shop");
        assert_eq!(shop.legacy.len(), 1);
        assert!(shop.actions.is_empty());
        assert!(set.in_namespace("nowhere").is_empty());
    }

    #[test]
    fn parses_top_level_json_list() {
        let json = r#"[{"kind":"ProbabilisticSampler","metadata":{"name":"p","namespace":"a"},
            "spec":{"signals":["TRACES"],"sampling_percentage":"25"}}]"#;
        let set = ManifestSet::parse_str(json, DEFAULT_NAMESPACE).unwrap();
        assert_eq!(set.legacy.len(), 1);
        assert_eq!(set.legacy[0].kind(), SamplerKind::Probabilistic);
    }

    #[test]
    fn malformed_known_kind_is_an_error() {
        let bad = "kind: ErrorSampler\nmetadata:\n  name: x\nspec:\n  fallback_sampling_ratio: high\n";
        let err = ManifestSet::parse_str(bad, DEFAULT_NAMESPACE).unwrap_err();
        assert!(matches!(err, Error::Parse { document: 0, .. }));
    }

    #[test]
    fn schemas_cover_every_kind() {
        let schemas = resource_schemas();
        assert_eq!(schemas.len(), 6);
        assert!(schemas.contains_key("Action"));
        assert!(schemas.contains_key("SpanAttributeSampler"));
    }
}
