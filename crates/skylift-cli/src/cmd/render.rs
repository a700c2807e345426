//! Render command

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use skylift_core::Engine;

/// Write the repository manifest and the per-artifact install manifests
/// under the public directory, ready to be served.
pub async fn render(engine: &Engine) -> Result<()> {
    let public = engine.config.public_dir();
    std::fs::create_dir_all(&public)
        .with_context(|| format!("failed to create {}", public.display()))?;

    let repository = engine.manifest.render().await?;
    write_atomic(&public.join("repository.json"), repository.as_bytes())?;

    let listing = engine.registry.list().await?;
    for artifact in &listing.artifacts {
        let dir = public.join("install").join(artifact.id.to_string());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let manifest = engine.registry.install_manifest(artifact.id).await?;
        write_atomic(&dir.join("manifest.plist"), &manifest)?;
    }

    println!(
        "  Wrote repository.json and {} install manifest(s) to {}",
        listing.artifacts.len(),
        public.display()
    );
    Ok(())
}

/// Documents in the public directory may be served while being
/// rewritten, so every write goes through a temp file and a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().context("target path has no parent")?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
