//! Explain command implementation.

use super::{load_store, target_namespaces, write_output};
use anyhow::{Context, Result};
use sampling_compiler::{generate_report, CompilerConfig, Reconciler};
use tracing::info;

/// Runs the explain command.
pub fn run(
    config: &CompilerConfig,
    manifests: &str,
    namespace: Option<&str>,
    output: Option<&str>,
) -> Result<()> {
    info!("Generating sampling report for: {}", manifests);
    let store = load_store(manifests)?;
    let reconciler = Reconciler::new(&store, config.clone());

    let mut sections = Vec::new();
    for ns in target_namespaces(&store, namespace)? {
        let report = reconciler
            .reconcile(&ns)
            .with_context(|| format!("Failed to compile namespace {ns}"))?;
        sections.push(generate_report(&report));
    }

    write_output(output, &sections.join("\n"))
}
