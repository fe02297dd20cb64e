//! Schema command implementation.

use anyhow::Result;
use sampling_actions::resource_schemas;

/// Prints the JSON schema of one kind, or of every kind keyed by name.
pub fn run(kind: Option<&str>) -> Result<()> {
    let schemas = resource_schemas();
    let json = match kind {
        Some(kind) => {
            let Some(schema) = schemas.get(kind) else {
                let known: Vec<_> = schemas.keys().copied().collect();
                anyhow::bail!("Unknown kind: {kind}. Known kinds: {}", known.join(", "));
            };
            serde_json::to_string_pretty(schema)?
        }
        None => serde_json::to_string_pretty(&schemas)?,
    };
    println!("{json}");
    Ok(())
}
