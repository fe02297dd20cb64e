//! Compiler configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Field-manager identity used when applying processors.
pub const DEFAULT_FIELD_MANAGER: &str = "sampling-compiler";

/// Engine that consumes latency samplers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyEngine {
    /// Latency filters become endpoint rules of the global sampling processor.
    /// Latency resources then never select the tail-sampling topology.
    Rules,
    /// Latency samplers become a tail-sampling policy.
    #[default]
    TailSampling,
}

impl fmt::Display for LatencyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rules => write!(f, "rules"),
            Self::TailSampling => write!(f, "tail_sampling"),
        }
    }
}

/// Compiler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Field-manager token for processor applies.
    pub field_manager: String,
    /// Synthesize unified actions for legacy resources before compiling.
    pub migrate_legacy: bool,
    /// Engine that consumes latency samplers.
    pub latency_engine: LatencyEngine,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            migrate_legacy: true,
            latency_engine: LatencyEngine::default(),
        }
    }
}

impl CompilerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the field manager.
    #[must_use]
    pub fn with_field_manager(mut self, manager: impl Into<String>) -> Self {
        self.field_manager = manager.into();
        self
    }

    /// Enables or disables legacy migration.
    #[must_use]
    pub const fn with_migration(mut self, enabled: bool) -> Self {
        self.migrate_legacy = enabled;
        self
    }

    /// Selects the engine for latency samplers.
    #[must_use]
    pub const fn with_latency_engine(mut self, engine: LatencyEngine) -> Self {
        self.latency_engine = engine;
        self
    }

    /// Parses a YAML (or JSON) configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or the field manager is empty.
    pub fn from_yaml(input: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Serializes the configuration to YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> Result<()> {
        if self.field_manager.trim().is_empty() {
            return Err(Error::Config("field_manager must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.field_manager, DEFAULT_FIELD_MANAGER);
        assert!(config.migrate_legacy);
        assert_eq!(config.latency_engine, LatencyEngine::TailSampling);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = CompilerConfig::from_yaml("latency_engine: rules\n").unwrap();
        assert_eq!(config.latency_engine, LatencyEngine::Rules);
        assert!(config.migrate_legacy);
    }

    #[test]
    fn empty_field_manager_is_rejected() {
        let err = CompilerConfig::from_yaml("field_manager: ''\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn yaml_round_trip() {
        let config = CompilerConfig::new()
            .with_field_manager("ops")
            .with_migration(false);
        let yaml = config.to_yaml().unwrap();
        assert_eq!(CompilerConfig::from_yaml(&yaml).unwrap(), config);
    }
}
