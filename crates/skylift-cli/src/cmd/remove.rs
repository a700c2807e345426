//! Remove command

use anyhow::Result;
use skylift_core::Engine;
use skylift_core::auth::Caller;
use skylift_schema::ArtifactId;

/// Delete an artifact: blob, record, and repository entries.
pub async fn remove(engine: &Engine, caller: &Caller, id: ArtifactId) -> Result<()> {
    engine.registry.delete(id, caller).await?;
    println!("  Removed artifact {id}. Its published links are now invalid.");
    Ok(())
}
