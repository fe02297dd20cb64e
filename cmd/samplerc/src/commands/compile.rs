//! Compile command implementation.

use super::{document, load_store, log_conditions, target_namespaces, OutputFormat};
use anyhow::{Context, Result};
use sampling_compiler::processor::PROCESSOR_KIND;
use sampling_compiler::{CompilerConfig, Processor, ReconcileReport, Reconciler, TEMPLATES};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Runs the compile command.
pub fn run(
    config: &CompilerConfig,
    manifests: &str,
    namespace: Option<&str>,
    output: Option<&str>,
    format: &str,
    strict: bool,
) -> Result<()> {
    let format = OutputFormat::parse(format)?;
    let store = load_store(manifests)?;
    let reconciler = Reconciler::new(&store, config.clone());

    let reports: Vec<ReconcileReport> = match namespace {
        Some(_) => target_namespaces(&store, namespace)?
            .iter()
            .map(|ns| {
                reconciler
                    .reconcile(ns)
                    .with_context(|| format!("Failed to compile namespace {ns}"))
            })
            .collect::<Result<_>>()?,
        None => reconciler
            .reconcile_all()
            .context("Failed to list namespaces")?
            .into_iter()
            .map(|(ns, report)| report.with_context(|| format!("Failed to compile namespace {ns}")))
            .collect::<Result<_>>()?,
    };

    let mut invalid = 0;
    let mut documents = Vec::new();
    for report in &reports {
        invalid += log_conditions(report);
        let processors = store.processors(&report.namespace)?;
        info!(
            "Namespace {}: {} processors ({} tail sampling)",
            report.namespace,
            processors.len(),
            report.topology
        );
        match output {
            Some(dir) => write_processors(Path::new(dir), &report.namespace, &processors, format)?,
            None => {
                for processor in &processors {
                    documents.push(document(PROCESSOR_KIND, processor)?);
                }
            }
        }
    }

    if output.is_none() {
        print!("{}", format.render(&documents)?);
    }

    if strict && invalid > 0 {
        anyhow::bail!("{invalid} resources have invalid configurations");
    }
    Ok(())
}

/// Writes one file per processor under `<dir>/<namespace>/` and removes files
/// of processors that no longer exist.
pub fn write_processors(
    dir: &Path,
    namespace: &str,
    processors: &[Processor],
    format: OutputFormat,
) -> Result<()> {
    let ns_dir = dir.join(namespace);
    fs::create_dir_all(&ns_dir)
        .with_context(|| format!("Failed to create output directory: {}", ns_dir.display()))?;

    for processor in processors {
        let path = ns_dir.join(format!("{}.{}", processor.name(), format.extension()));
        let content = format.render(&[document(PROCESSOR_KIND, processor)?])?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write output file: {}", path.display()))?;
        info!("Processor written to: {}", path.display());
    }

    for template in &TEMPLATES {
        if processors.iter().any(|p| p.name() == template.name) {
            continue;
        }
        let path = ns_dir.join(format!("{}.{}", template.name, format.extension()));
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stale file: {}", path.display()))?;
            debug!("Removed stale {}", path.display());
        }
    }
    Ok(())
}
