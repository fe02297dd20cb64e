//! Init command implementation.

use anyhow::{Context, Result};
use sampling_compiler::CompilerConfig;
use std::fs;
use std::path::Path;
use tracing::info;

const ACTIONS: &str = r#"apiVersion: sampling.io/v1alpha1
kind: Action
metadata:
  name: keep-errors
  namespace: default
spec:
  actionName: Keep failing traces
  signals: [TRACES]
  samplers:
    errorSampler:
      fallback_sampling_ratio: 10
---
apiVersion: sampling.io/v1alpha1
kind: Action
metadata:
  name: checkout-focus
  namespace: default
spec:
  signals: [TRACES]
  samplers:
    serviceNameSampler:
      services_name_filters:
        - service_name: checkout
          sampling_ratio: 100
          fallback_sampling_ratio: 5
    spanAttributeSampler:
      attribute_filters:
        - service_name: checkout
          attribute_key: customer.tier
          condition:
            string_condition:
              operation: equals
              expected_value: premium
          fallback_sampling_ratio: 5
"#;

const LEGACY: &str = r#"apiVersion: actions.sampling.io/v1alpha1
kind: LatencySampler
metadata:
  name: slow-checkout
  namespace: default
spec:
  signals: [TRACES]
  endpoints_filters:
    - service_name: checkout
      http_route: /api/checkout
      minimum_latency_threshold: 500
      fallback_sampling_ratio: 1
---
apiVersion: actions.sampling.io/v1alpha1
kind: ProbabilisticSampler
metadata:
  name: baseline
  namespace: default
spec:
  signals: [TRACES]
  sampling_percentage: "10"
"#;

const README: &str = r#"# Sampling Actions

This directory contains trace sampling actions compiled by `samplerc`.

## Files

- `manifests/actions.yaml` - Unified `Action` resources (edit these)
- `manifests/legacy.yaml` - Legacy single-purpose samplers, migrated on compile
- `samplerc.yaml` - Compiler configuration
- `processors/` - Generated processor documents (don't edit)

## Commands

```bash
# Compile manifests into processors
samplerc --config samplerc.yaml compile --output processors

# Preview the unified actions for legacy samplers
samplerc migrate

# Explain what each namespace compiles into
samplerc explain --output sampling.md

# Recompile on every change
samplerc watch
```
"#;

fn write_if_absent(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        info!("Skipped: {} (already exists)", path.display());
        return Ok(());
    }
    fs::write(path, content).with_context(|| format!("Failed to create {}", path.display()))?;
    info!("Created: {}", path.display());
    Ok(())
}

/// Runs the init command.
pub fn run(path: &str) -> Result<()> {
    let project_path = Path::new(path);
    info!("Initializing sampling project at: {}", project_path.display());

    let manifests = project_path.join("manifests");
    fs::create_dir_all(&manifests).with_context(|| "Failed to create manifests directory")?;

    write_if_absent(&manifests.join("actions.yaml"), ACTIONS)?;
    write_if_absent(&manifests.join("legacy.yaml"), LEGACY)?;
    write_if_absent(
        &project_path.join("samplerc.yaml"),
        &CompilerConfig::default().to_yaml()?,
    )?;
    write_if_absent(&project_path.join("README.md"), README)?;

    info!("Sampling project initialized successfully!");
    info!("");
    info!("Next steps:");
    info!("  1. Edit manifests/actions.yaml to define your sampling actions");
    info!("  2. Run 'samplerc explain' to review the result");
    info!("  3. Run 'samplerc compile --output processors' to generate processors");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sampling_actions::{ManifestSet, DEFAULT_NAMESPACE};
    use sampling_compiler::{MemoryStore, Reconciler};

    #[test]
    fn scaffolded_manifests_compile_cleanly() {
        let mut set = ManifestSet::parse_str(ACTIONS, DEFAULT_NAMESPACE).unwrap();
        let legacy = ManifestSet::parse_str(LEGACY, DEFAULT_NAMESPACE).unwrap();
        set.legacy.extend(legacy.legacy);
        assert_eq!(set.len(), 4);

        let store = MemoryStore::from_manifests(set).unwrap();
        let report = Reconciler::new(&store, CompilerConfig::default())
            .reconcile(DEFAULT_NAMESPACE)
            .unwrap();

        assert_eq!(report.migration.created.len(), 2);
        assert!(report.conditions.values().all(|c| c.is_true()));
        assert_eq!(store.processors(DEFAULT_NAMESPACE).unwrap().len(), 2);
    }
}
