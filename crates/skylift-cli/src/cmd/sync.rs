//! Sync command

use anyhow::Result;
use skylift_core::auth::Caller;
use skylift_core::{Engine, Error};
use skylift_schema::ArtifactId;

/// Merge an artifact snapshot into the repository manifest.
pub async fn sync(engine: &Engine, caller: &Caller, id: ArtifactId) -> Result<()> {
    // A conflict means an out-of-band writer touched the document; the
    // builder has already reloaded it, so one retry runs on fresh state.
    let manifest = match engine.sync_artifact(id, caller).await {
        Err(Error::Conflict(_)) => engine.sync_artifact(id, caller).await?,
        other => other?,
    };

    let artifact = engine.registry.get(id).await?;
    let versions = manifest
        .find_app(&artifact.bundle_id)
        .map_or(0, |app| app.versions.len());
    println!(
        "  Synced {} {}. Repository now lists {versions} version(s) of {}.",
        artifact.app_name, artifact.version, artifact.bundle_id
    );
    Ok(())
}
