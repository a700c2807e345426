//! Integration tests for the assembled engine: identifier and link
//! stability, signing transitions, delete semantics, and repository
//! synchronization.

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use skylift_core::auth::Caller;
use skylift_core::links::shorten_or_fallback;
use skylift_core::signing::{Resigner, SignError};
use skylift_core::{Artifact, ArtifactPatch, Certificate, Config, Engine, Error, NewArtifact};
use skylift_schema::ArtifactId;

/// Build a minimal but well-formed application package.
fn stub_ipa(bundle_id: &str, version: &str, name: &str) -> Vec<u8> {
    let info = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleIdentifier</key><string>{bundle_id}</string>
    <key>CFBundleShortVersionString</key><string>{version}</string>
    <key>CFBundleName</key><string>{name}</string>
    <key>MinimumOSVersion</key><string>13.0</string>
</dict>
</plist>"#
    );

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(&mut cursor);
    let options = SimpleFileOptions::default();
    writer
        .start_file(format!("Payload/{name}.app/Info.plist"), options)
        .unwrap();
    writer.write_all(info.as_bytes()).unwrap();
    writer
        .start_file(format!("Payload/{name}.app/{name}"), options)
        .unwrap();
    writer.write_all(b"\xca\xfe\xba\xbebinary").unwrap();
    writer.finish().unwrap();
    cursor.into_inner()
}

/// Signer stub that appends a marker instead of invoking a real signer.
struct StampSigner;

#[async_trait]
impl Resigner for StampSigner {
    async fn resign(
        &self,
        input: &Path,
        output: &Path,
        _certificate: &Certificate,
    ) -> Result<(), SignError> {
        let mut bytes = std::fs::read(input)?;
        bytes.extend_from_slice(b"+signed");
        std::fs::write(output, bytes)?;
        Ok(())
    }
}

/// Signer stub that always rejects the credentials.
struct RefusingSigner;

#[async_trait]
impl Resigner for RefusingSigner {
    async fn resign(
        &self,
        _input: &Path,
        _output: &Path,
        _certificate: &Certificate,
    ) -> Result<(), SignError> {
        Err(SignError::Signer(
            "certificate does not match the package".to_string(),
        ))
    }
}

/// Engine over a throwaway data directory.
struct TestContext {
    _dir: TempDir,
    engine: Engine,
    caller: Caller,
}

impl TestContext {
    fn new(signer: Arc<dyn Resigner>) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let config = Config::for_dir(dir.path(), "https://repo.test");
        Self::with_config(dir, config, signer)
    }

    fn with_config(dir: TempDir, config: Config, signer: Arc<dyn Resigner>) -> Self {
        let engine = Engine::with_parts(config, None, Some(signer)).expect("failed to start engine");
        let caller = engine.authenticate("").expect("open verifier rejected the caller");
        Self {
            _dir: dir,
            engine,
            caller,
        }
    }

    async fn upload(&self, bundle: &str, version: &str, name: &str) -> Artifact {
        self.engine
            .registry
            .create(
                &stub_ipa(bundle, version, name),
                NewArtifact::default(),
                &self.caller,
            )
            .await
            .expect("upload failed")
    }

    async fn certificate(&self) -> i64 {
        self.engine
            .certs
            .create("Team A", b"key-bytes", b"profile-bytes", None, None, &self.caller)
            .await
            .expect("certificate registration failed")
            .id
    }

    fn blob_path(&self, id: ArtifactId) -> std::path::PathBuf {
        self.engine.config.blobs_dir().join(format!("{id}.ipa"))
    }
}

#[tokio::test]
async fn test_upload_fills_metadata_from_package() {
    let ctx = TestContext::new(Arc::new(StampSigner));
    let artifact = ctx.upload("com.x.y", "1.0.0", "Clock").await;

    assert_eq!(artifact.bundle_id, "com.x.y");
    assert_eq!(artifact.version, "1.0.0");
    assert_eq!(artifact.app_name, "Clock");
    assert_eq!(artifact.min_os_version, "13.0");
    assert_eq!(artifact.slug, "clock");
    assert!(artifact.signed_at.is_none());
}

#[tokio::test]
async fn test_upload_rejects_contradicting_bundle_id() {
    let ctx = TestContext::new(Arc::new(StampSigner));
    let err = ctx
        .engine
        .registry
        .create(
            &stub_ipa("com.x.y", "1.0.0", "Clock"),
            NewArtifact {
                bundle_id: Some("com.other.app".to_string()),
                ..NewArtifact::default()
            },
            &ctx.caller,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_upload_ceiling_is_enforced() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::for_dir(dir.path(), "https://repo.test");
    config.max_upload_bytes = 64;
    let ctx = TestContext::with_config(dir, config, Arc::new(StampSigner));

    let err = ctx
        .engine
        .registry
        .create(
            &stub_ipa("com.x.y", "1.0.0", "Clock"),
            NewArtifact::default(),
            &ctx.caller,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert!(ctx.engine.registry.list().await.unwrap().artifacts.is_empty());
}

#[tokio::test]
async fn test_id_and_links_survive_edit_replace_and_sign() {
    let ctx = TestContext::new(Arc::new(StampSigner));
    let artifact = ctx.upload("com.x.y", "1.0.0", "Clock").await;
    let links = ctx.engine.registry.links_for(&artifact);

    // Metadata edit, including a rename.
    let patched = ctx
        .engine
        .registry
        .update(
            artifact.id,
            ArtifactPatch {
                app_name: Some("Clock Pro".to_string()),
                changelog: Some("faster hands".to_string()),
                ..ArtifactPatch::default()
            },
            None,
            &ctx.caller,
        )
        .await
        .unwrap();
    assert_eq!(patched.id, artifact.id);
    assert_eq!(ctx.engine.registry.links_for(&patched), links);

    // Binary replacement under the same id.
    let replaced = ctx
        .engine
        .registry
        .update(
            artifact.id,
            ArtifactPatch::default(),
            Some(stub_ipa("com.x.y", "1.0.1", "Clock")),
            &ctx.caller,
        )
        .await
        .unwrap();
    assert_eq!(replaced.id, artifact.id);
    assert_ne!(replaced.checksum, artifact.checksum);
    assert_eq!(ctx.engine.registry.links_for(&replaced), links);

    // Re-sign, still the same id and links.
    let cert = ctx.certificate().await;
    ctx.engine
        .pipeline
        .sign(artifact.id, cert, &ctx.caller)
        .await
        .unwrap();
    let signed = ctx.engine.registry.get(artifact.id).await.unwrap();
    assert_eq!(signed.id, artifact.id);
    assert!(signed.signed_at.is_some());
    assert_eq!(ctx.engine.registry.links_for(&signed), links);

    let blob = std::fs::read(ctx.blob_path(artifact.id)).unwrap();
    assert!(blob.ends_with(b"+signed"));
}

#[tokio::test]
async fn test_failed_sign_leaves_artifact_untouched() {
    let ctx = TestContext::new(Arc::new(RefusingSigner));
    let artifact = ctx.upload("com.x.y", "1.0.0", "Clock").await;
    let cert = ctx.certificate().await;
    let blob_before = std::fs::read(ctx.blob_path(artifact.id)).unwrap();

    let err = ctx
        .engine
        .pipeline
        .sign(artifact.id, cert, &ctx.caller)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Signing(_)));

    let after = ctx.engine.registry.get(artifact.id).await.unwrap();
    assert!(after.signed_at.is_none());
    assert_eq!(after.checksum, artifact.checksum);
    assert_eq!(std::fs::read(ctx.blob_path(artifact.id)).unwrap(), blob_before);

    // No orphaned scratch state either.
    let tmp_entries: Vec<_> = std::fs::read_dir(ctx.engine.config.tmp_dir())
        .unwrap()
        .collect();
    assert!(tmp_entries.is_empty());
}

#[tokio::test]
async fn test_resign_repeats_the_transition() {
    let ctx = TestContext::new(Arc::new(StampSigner));
    let artifact = ctx.upload("com.x.y", "1.0.0", "Clock").await;
    let cert = ctx.certificate().await;

    ctx.engine
        .pipeline
        .sign(artifact.id, cert, &ctx.caller)
        .await
        .unwrap();
    let first = ctx.engine.registry.get(artifact.id).await.unwrap();

    ctx.engine
        .pipeline
        .sign(artifact.id, cert, &ctx.caller)
        .await
        .unwrap();
    let second = ctx.engine.registry.get(artifact.id).await.unwrap();

    assert!(second.signed_at.is_some());
    assert_ne!(second.checksum, first.checksum);
    let blob = std::fs::read(ctx.blob_path(artifact.id)).unwrap();
    assert!(blob.ends_with(b"+signed+signed"));
}

#[tokio::test]
async fn test_inactive_certificate_is_not_offered() {
    let ctx = TestContext::new(Arc::new(StampSigner));
    let artifact = ctx.upload("com.x.y", "1.0.0", "Clock").await;
    let cert = ctx.certificate().await;

    ctx.engine
        .certs
        .update(
            cert,
            skylift_core::CertificatePatch {
                is_active: Some(false),
                ..skylift_core::CertificatePatch::default()
            },
            &ctx.caller,
        )
        .await
        .unwrap();

    let err = ctx
        .engine
        .pipeline
        .submit(artifact.id, cert, &ctx.caller)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Signing(_)));
    assert!(ctx.engine.certs.list(true).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_semantics_and_manifest_prune() {
    let ctx = TestContext::new(Arc::new(StampSigner));

    let missing = ArtifactId::from_millis(12345);
    assert!(matches!(
        ctx.engine.registry.delete(missing, &ctx.caller).await,
        Err(Error::NotFound(_))
    ));

    let artifact = ctx.upload("com.x.y", "1.0.0", "Clock").await;
    ctx.engine.sync_artifact(artifact.id, &ctx.caller).await.unwrap();
    assert!(ctx.blob_path(artifact.id).exists());

    ctx.engine.registry.delete(artifact.id, &ctx.caller).await.unwrap();

    assert!(ctx.engine.registry.list().await.unwrap().artifacts.is_empty());
    assert!(!ctx.blob_path(artifact.id).exists());
    assert!(ctx.engine.manifest.snapshot().await.find_app("com.x.y").is_none());

    // A second delete reports the stale reference.
    assert!(matches!(
        ctx.engine.registry.delete(artifact.id, &ctx.caller).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_metadata_edit_unknown_artifact_is_not_found() {
    let ctx = TestContext::new(Arc::new(StampSigner));
    let err = ctx
        .engine
        .registry
        .update(
            ArtifactId::from_millis(1),
            ArtifactPatch::default(),
            None,
            &ctx.caller,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_sync_twice_then_new_version_orders_newest_first() {
    let ctx = TestContext::new(Arc::new(StampSigner));

    let first = ctx.upload("com.x.y", "1.0.0", "Clock").await;
    ctx.engine.sync_artifact(first.id, &ctx.caller).await.unwrap();
    let doc = ctx.engine.sync_artifact(first.id, &ctx.caller).await.unwrap();
    assert_eq!(doc.find_app("com.x.y").unwrap().versions.len(), 1);

    // Distinct upload instant, so the version dates are ordered.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = ctx.upload("com.x.y", "1.0.1", "Clock").await;
    let doc = ctx.engine.sync_artifact(second.id, &ctx.caller).await.unwrap();

    let versions = &doc.find_app("com.x.y").unwrap().versions;
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version, "1.0.1");
    assert_eq!(versions[1].version, "1.0.0");
    assert!(versions[0].date > versions[1].date);
}

#[tokio::test]
async fn test_concurrent_syncs_do_not_drop_each_other() {
    let ctx = Arc::new(TestContext::new(Arc::new(StampSigner)));

    let mut handles = Vec::new();
    for i in 0..6 {
        let ctx = Arc::clone(&ctx);
        handles.push(tokio::spawn(async move {
            let bundle = format!("com.fleet.app{i}");
            let artifact = ctx
                .engine
                .registry
                .create(
                    &stub_ipa(&bundle, "1.0.0", &format!("App{i}")),
                    NewArtifact::default(),
                    &ctx.caller,
                )
                .await
                .expect("upload failed");
            ctx.engine
                .sync_artifact(artifact.id, &ctx.caller)
                .await
                .expect("sync failed");
            bundle
        }));
    }

    let mut bundles = Vec::new();
    for handle in handles {
        bundles.push(handle.await.unwrap());
    }

    let manifest = ctx.engine.manifest.snapshot().await;
    assert_eq!(manifest.apps.len(), 6);
    for bundle in bundles {
        assert_eq!(manifest.find_app(&bundle).unwrap().versions.len(), 1);
    }
}

#[tokio::test]
async fn test_unreachable_shortener_degrades_to_long_link() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::for_dir(dir.path(), "https://repo.test");
    config.shortener_endpoint = Some("http://127.0.0.1:9".to_string());
    config.shortener_timeout_secs = 1;
    let ctx = TestContext::with_config(dir, config, Arc::new(StampSigner));

    let artifact = ctx.upload("com.x.y", "1.0.0", "Clock").await;
    let links = ctx.engine.registry.links_for(&artifact);
    let shortener = ctx.engine.shortener.as_ref().expect("shortener configured");

    let share = shorten_or_fallback(shortener.as_ref(), &links.short).await;
    assert_eq!(share, links.short);
}

#[tokio::test]
async fn test_install_manifest_references_direct_link() {
    let ctx = TestContext::new(Arc::new(StampSigner));
    let artifact = ctx.upload("com.x.y", "1.0.0", "Clock").await;
    let links = ctx.engine.registry.links_for(&artifact);

    let plist = ctx.engine.registry.install_manifest(artifact.id).await.unwrap();
    let xml = String::from_utf8(plist).unwrap();
    assert!(xml.contains(&links.direct));
    assert!(xml.contains("com.x.y"));
    assert!(xml.contains("software-package"));
}
