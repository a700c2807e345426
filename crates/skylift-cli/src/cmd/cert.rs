//! Certificate commands

use std::path::Path;

use anyhow::{Context, Result};
use skylift_core::auth::Caller;
use skylift_core::{CertificatePatch, Engine};

use super::short_date;

/// Register a signing identity from its two credential files.
pub async fn add(
    engine: &Engine,
    caller: &Caller,
    name: &str,
    key: &Path,
    profile: &Path,
    password: Option<String>,
    description: Option<String>,
) -> Result<()> {
    let key_bundle =
        std::fs::read(key).with_context(|| format!("failed to read {}", key.display()))?;
    let provisioning_profile =
        std::fs::read(profile).with_context(|| format!("failed to read {}", profile.display()))?;

    let certificate = engine
        .certs
        .create(
            name,
            &key_bundle,
            &provisioning_profile,
            password,
            description,
            caller,
        )
        .await?;

    println!(
        "  Registered certificate {} as id {}.",
        certificate.name, certificate.id
    );
    Ok(())
}

/// List certificates; active only unless `all` is set.
pub async fn list(engine: &Engine, all: bool) -> Result<()> {
    let certificates = engine.certs.list(!all).await?;

    if certificates.is_empty() {
        println!();
        println!("  No certificates registered.");
        return Ok(());
    }

    println!();
    println!("  {:<6} {:<24} {:<8} {}", "ID", "NAME", "ACTIVE", "ADDED");
    for cert in &certificates {
        println!(
            "  {:<6} {:<24} {:<8} {}",
            cert.id,
            cert.name,
            if cert.is_active { "yes" } else { "no" },
            short_date(cert.created_at),
        );
    }
    Ok(())
}

/// Deactivate a certificate without touching its credential files.
pub async fn deactivate(engine: &Engine, caller: &Caller, id: i64) -> Result<()> {
    let patch = CertificatePatch {
        is_active: Some(false),
        ..CertificatePatch::default()
    };
    let certificate = engine.certs.update(id, patch, caller).await?;
    println!("  Deactivated certificate {} ({id}).", certificate.name);
    Ok(())
}

/// Delete a certificate and its credential files.
pub async fn remove(engine: &Engine, caller: &Caller, id: i64) -> Result<()> {
    engine.certs.delete(id, caller).await?;
    println!("  Removed certificate {id} and its credential files.");
    Ok(())
}
