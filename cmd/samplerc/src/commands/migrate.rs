//! Migrate command implementation.

use super::{document, load_store, target_namespaces, write_output, OutputFormat};
use anyhow::Result;
use sampling_actions::{ACTION_KIND, MIGRATED_FROM_LABEL};
use sampling_compiler::{pending_migrations, ActionSet};
use tracing::info;

/// Runs the migrate command.
///
/// Without `emit` this is a dry run that only lists what would be created.
pub fn run(
    manifests: &str,
    namespace: Option<&str>,
    emit: bool,
    output: Option<&str>,
    format: &str,
) -> Result<()> {
    let format = OutputFormat::parse(format)?;
    let store = load_store(manifests)?;

    let mut documents = Vec::new();
    for ns in target_namespaces(&store, namespace)? {
        let actions = ActionSet::load(&store, &ns)?;
        for legacy in actions.legacy() {
            if actions.has_migrated(legacy) {
                info!("{} already has a unified counterpart", legacy.object_ref());
            }
        }
        for action in pending_migrations(&actions) {
            let source = action
                .metadata
                .labels
                .get(MIGRATED_FROM_LABEL)
                .map_or("?", String::as_str);
            info!(
                "{} {} -> {}",
                if emit { "Migrating" } else { "Would migrate" },
                source,
                action.object_ref()
            );
            documents.push(document(ACTION_KIND, &action)?);
        }
    }

    if !emit {
        info!(
            "Dry run: {} actions would be created. Use --emit to write them.",
            documents.len()
        );
        return Ok(());
    }
    if documents.is_empty() {
        info!("Nothing to migrate");
        return Ok(());
    }
    write_output(output, &format.render(&documents)?)
}
