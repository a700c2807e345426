//! Upload command

use std::path::Path;

use anyhow::{Context, Result};
use skylift_core::auth::Caller;
use skylift_core::links::shorten_or_fallback;
use skylift_core::{Engine, NewArtifact};

use super::human_size;

/// Register an uploaded binary and print its published links.
pub async fn upload(
    engine: &Engine,
    caller: &Caller,
    file: &Path,
    meta: NewArtifact,
    sync: bool,
) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let artifact = engine.registry.create(&bytes, meta, caller).await?;
    let links = engine.registry.links_for(&artifact);
    let share = match &engine.shortener {
        Some(shortener) => shorten_or_fallback(shortener.as_ref(), &links.short).await,
        None => links.short.clone(),
    };

    println!();
    println!(
        "  Registered {} {} as artifact {}",
        artifact.app_name, artifact.version, artifact.id
    );
    println!(
        "  bundle: {}  size: {}",
        artifact.bundle_id,
        human_size(artifact.size_bytes)
    );
    println!();
    println!("  install:  {}", links.install);
    println!("  download: {}", links.direct);
    println!("  page:     {}", links.page);
    println!("  share:    {share}");

    if sync {
        engine.sync_artifact(artifact.id, caller).await?;
        println!();
        println!("  Merged into the repository manifest.");
    }

    Ok(())
}
