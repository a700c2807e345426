//! Edit command

use std::path::Path;

use anyhow::{Context, Result};
use skylift_core::auth::Caller;
use skylift_core::{ArtifactPatch, Engine};
use skylift_schema::ArtifactId;

use super::human_size;

/// Merge a metadata patch and optionally replace the stored binary.
pub async fn edit(
    engine: &Engine,
    caller: &Caller,
    id: ArtifactId,
    patch: ArtifactPatch,
    file: Option<&Path>,
) -> Result<()> {
    if patch.is_empty() && file.is_none() {
        println!("  Nothing to change.");
        return Ok(());
    }

    let binary = match file {
        Some(path) => Some(
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };
    let replaced = binary.is_some();
    let artifact = engine.registry.update(id, patch, binary, caller).await?;

    println!();
    println!("  Updated {} ({})", artifact.app_name, artifact.id);
    if replaced {
        println!("  Binary replaced: {}", human_size(artifact.size_bytes));
    }
    println!("  Published links are unchanged.");
    Ok(())
}
