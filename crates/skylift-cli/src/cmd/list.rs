//! List command

use anyhow::Result;
use skylift_core::Engine;

use super::{human_size, short_date};

/// List all artifacts with storage totals.
pub async fn list(engine: &Engine, json: bool) -> Result<()> {
    let listing = engine.registry.list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if listing.artifacts.is_empty() {
        println!();
        println!("  No artifacts registered.");
        println!("  Run 'skylift upload <file.ipa>' to get started.");
        return Ok(());
    }

    println!();
    println!(
        "  {:<15} {:<24} {:<12} {:<10} {:<17} {}",
        "ID", "NAME", "VERSION", "SIZE", "UPLOADED", "SIGNED"
    );
    for artifact in &listing.artifacts {
        let signed = artifact
            .signed_at
            .map_or_else(|| "-".to_string(), short_date);
        println!(
            "  {:<15} {:<24} {:<12} {:<10} {:<17} {signed}",
            artifact.id.to_string(),
            artifact.app_name,
            artifact.version,
            human_size(artifact.size_bytes),
            short_date(artifact.created_at),
        );
    }
    println!();
    println!(
        "  {} artifacts, {} of {} used",
        listing.artifacts.len(),
        human_size(listing.totals.used_bytes),
        human_size(listing.totals.quota_bytes)
    );
    Ok(())
}
