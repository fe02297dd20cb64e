//! Subcommand implementations and the helpers they share.

pub mod compile;
pub mod explain;
pub mod init;
pub mod migrate;
pub mod schema;
pub mod watch;

use anyhow::{Context, Result};
use sampling_actions::meta::ACTION_API_VERSION;
use sampling_actions::{ManifestSet, DEFAULT_NAMESPACE};
use sampling_compiler::status::Reason;
use sampling_compiler::{CompilerConfig, MemoryStore, ReconcileReport, ResourceStore};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Encoding of emitted documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `---` separated YAML documents.
    Yaml,
    /// Pretty JSON; several documents become an array.
    Json,
}

impl OutputFormat {
    /// Parses `yaml`, `yml` or `json`.
    pub fn parse(format: &str) -> Result<Self> {
        match format.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => anyhow::bail!("Unknown output format: {format}. Use 'yaml' or 'json'."),
        }
    }

    /// File extension for this format.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }

    /// Renders documents.
    pub fn render(self, documents: &[Value]) -> Result<String> {
        match self {
            Self::Yaml => {
                let mut out = String::new();
                for (i, document) in documents.iter().enumerate() {
                    if i > 0 {
                        out.push_str("---\n");
                    }
                    out.push_str(&serde_yaml::to_string(document)?);
                }
                Ok(out)
            }
            Self::Json => {
                let mut out = match documents {
                    [single] => serde_json::to_string_pretty(single)?,
                    many => serde_json::to_string_pretty(many)?,
                };
                out.push('\n');
                Ok(out)
            }
        }
    }
}

/// Loads the compiler configuration, or the defaults if no path is given.
pub fn load_config(path: Option<&str>) -> Result<CompilerConfig> {
    let Some(path) = path else {
        return Ok(CompilerConfig::default());
    };
    let config = CompilerConfig::load(path)
        .with_context(|| format!("Failed to load config file: {path}"))?;
    info!(
        "Loaded config from {} (latency engine: {})",
        path, config.latency_engine
    );
    Ok(config)
}

/// Loads manifests from a file or directory.
pub fn load_manifests(path: &str) -> Result<ManifestSet> {
    if !Path::new(path).exists() {
        anyhow::bail!("Manifests not found: {path}");
    }
    ManifestSet::load_path(path, DEFAULT_NAMESPACE)
        .with_context(|| format!("Failed to load manifests from: {path}"))
}

/// Loads manifests into a fresh in-memory store.
pub fn load_store(path: &str) -> Result<MemoryStore> {
    let manifests = load_manifests(path)?;
    info!("Loaded {} resources from {}", manifests.len(), path);
    MemoryStore::from_manifests(manifests).with_context(|| format!("Invalid manifests in: {path}"))
}

/// Namespaces to operate on: the requested one, or every namespace in the store.
pub fn target_namespaces(store: &MemoryStore, namespace: Option<&str>) -> Result<Vec<String>> {
    let known = store.namespaces()?;
    match namespace {
        Some(ns) => {
            if !known.iter().any(|k| k == ns) {
                warn!("Namespace {} has no sampling resources", ns);
            }
            Ok(vec![ns.to_string()])
        }
        None => Ok(known),
    }
}

/// Wraps a resource in a document carrying `apiVersion` and `kind`.
pub fn document(kind: &str, resource: &impl Serialize) -> Result<Value> {
    let mut out = Map::new();
    out.insert("apiVersion".to_string(), Value::from(ACTION_API_VERSION));
    out.insert("kind".to_string(), Value::from(kind));
    match serde_json::to_value(resource)? {
        Value::Object(fields) => out.extend(fields),
        other => anyhow::bail!("{kind} did not serialize to an object: {other}"),
    }
    Ok(Value::Object(out))
}

/// Writes to a file, or to stdout when no path (or `-`) is given.
pub fn write_output(path: Option<&str>, content: &str) -> Result<()> {
    match path {
        None | Some("-") => {
            print!("{content}");
            Ok(())
        }
        Some(path) => {
            fs::write(path, content).with_context(|| format!("Failed to write output file: {path}"))?;
            info!("Written to: {}", path);
            Ok(())
        }
    }
}

/// Logs the conditions of a reconciled namespace. Returns how many resources
/// had an invalid configuration.
pub fn log_conditions(report: &ReconcileReport) -> usize {
    let mut invalid = 0;
    for (target, condition) in &report.conditions {
        if condition.is_true() {
            continue;
        }
        if condition.reason == Reason::InvalidConfig.as_str() {
            invalid += 1;
        }
        warn!("{}: {} ({})", target, condition.reason, condition.message);
    }
    invalid
}

#[cfg(test)]
mod tests {
    use super::*;
    use sampling_actions::Action;

    #[test]
    fn output_format_parsing() {
        assert_eq!(OutputFormat::parse("YML").unwrap(), OutputFormat::Yaml);
        assert_eq!(OutputFormat::parse("json").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::parse("toml").is_err());
    }

    #[test]
    fn document_leads_with_api_version_and_kind() {
        let doc = document("Action", &Action::new("shop", "errors")).unwrap();
        let keys: Vec<_> = doc.as_object().unwrap().keys().take(3).cloned().collect();
        assert_eq!(keys, vec!["apiVersion", "kind", "metadata"]);
    }

    #[test]
    fn yaml_documents_are_separated() {
        let docs = vec![serde_json::json!({"a": 1}), serde_json::json!({"b": 2})];
        insta::assert_snapshot!(OutputFormat::Yaml.render(&docs).unwrap(), @r###"
        a: 1
        ---
        b: 2
        "###);
    }
}
