//! Artifact registry.
//!
//! Source of truth for "what apps exist": one record per uploaded
//! binary, with the blob store holding the bytes and the catalog holding
//! the metadata. All operations on one artifact are serialized through a
//! keyed lock so a sign and a binary replacement cannot race; operations
//! on different artifacts are independent.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::auth::Caller;
use crate::config::Config;
use crate::error::Error;
use crate::ipa;
use crate::links::{self, Links};
use crate::manifest::ManifestBuilder;
use crate::store::blob::{BinaryStore, StoreError};
use crate::store::DbHandle;
use crate::types::{Artifact, ArtifactPatch, NewArtifact, RegistryListing, StorageTotals};
use skylift_schema::{ArtifactId, InstallManifest};

/// At-most-one concurrent mutation per artifact.
///
/// The map only ever grows by one entry per live artifact id; entries
/// are tiny and ids are bounded by upload count.
#[derive(Debug, Default)]
pub struct ArtifactLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ArtifactLocks {
    /// Take the mutation lock for one artifact.
    pub async fn acquire(&self, id: ArtifactId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(id.as_millis())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// The registry facade.
pub struct Registry {
    db: DbHandle,
    blobs: Arc<dyn BinaryStore>,
    manifest: Arc<ManifestBuilder>,
    locks: Arc<ArtifactLocks>,
    base_url: String,
    max_upload_bytes: u64,
    storage_quota_bytes: u64,
}

impl Registry {
    /// Wire the registry over its collaborators.
    pub fn new(
        db: DbHandle,
        blobs: Arc<dyn BinaryStore>,
        manifest: Arc<ManifestBuilder>,
        locks: Arc<ArtifactLocks>,
        config: &Config,
    ) -> Self {
        Self {
            db,
            blobs,
            manifest,
            locks,
            base_url: config.base_url.clone(),
            max_upload_bytes: config.max_upload_bytes,
            storage_quota_bytes: config.storage_quota_bytes,
        }
    }

    /// Register an uploaded binary.
    ///
    /// Metadata fields left unset are filled from the package's own
    /// `Info.plist`; a supplied bundle id that contradicts the package
    /// is rejected. The artifact id is minted here, once, from the
    /// upload clock.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a malformed package or missing required
    /// metadata, [`Error::Storage`] when the binary cannot be persisted
    /// (including the upload ceiling and quota).
    pub async fn create(
        &self,
        bytes: &[u8],
        meta: NewArtifact,
        _caller: &Caller,
    ) -> Result<Artifact, Error> {
        let size = bytes.len() as u64;
        if size > self.max_upload_bytes {
            return Err(StoreError::TooLarge {
                size,
                limit: self.max_upload_bytes,
            }
            .into());
        }

        let info = ipa::inspect(bytes)?;
        if let Some(supplied) = meta.bundle_id.as_deref()
            && !supplied.is_empty()
            && supplied != info.bundle_id
        {
            return Err(Error::Validation(format!(
                "bundle id mismatch: metadata says {supplied}, package says {}",
                info.bundle_id
            )));
        }

        let app_name = meta
            .app_name
            .filter(|n| !n.is_empty())
            .or(info.name)
            .ok_or_else(|| Error::Validation("appName is required".to_string()))?;
        let version = meta
            .version
            .filter(|v| !v.is_empty())
            .unwrap_or(info.version);
        if version.is_empty() {
            return Err(Error::Validation("version is required".to_string()));
        }

        let used = self.used_bytes().await?;
        if used + size > self.storage_quota_bytes {
            return Err(Error::Storage(format!(
                "storage quota exhausted: {used} + {size} > {} bytes",
                self.storage_quota_bytes
            )));
        }

        let now = chrono::Utc::now().timestamp_millis();
        let artifact = Artifact {
            id: ArtifactId::from_millis(now),
            slug: links::slugify(&app_name),
            app_name,
            bundle_id: info.bundle_id,
            version,
            developer: meta.developer.unwrap_or_default(),
            support_email: meta.support_email.unwrap_or_default(),
            description: meta.description.unwrap_or_default(),
            changelog: meta.changelog.unwrap_or_default(),
            icon_url: meta.icon_url.unwrap_or_default(),
            screenshot_urls: meta.screenshot_urls.unwrap_or_default(),
            min_os_version: info.min_os_version.unwrap_or_else(|| "12.0".to_string()),
            size_bytes: size,
            checksum: blake3::hash(bytes).to_hex().to_string(),
            created_at: now,
            updated_at: now,
            signed_at: None,
        };

        // Reserve the id first; undo the record if the bytes cannot land.
        let artifact = self.db.insert_artifact(artifact).await?;
        if let Err(e) = self.blobs.put(artifact.id, bytes).await {
            self.db.delete_artifact(artifact.id).await.ok();
            return Err(e.into());
        }

        info!(id = %artifact.id, bundle = %artifact.bundle_id, version = %artifact.version, "artifact registered");
        Ok(artifact)
    }

    /// Merge a metadata patch and optionally replace the binary.
    ///
    /// Neither path changes the artifact id or any previously issued
    /// link.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id; binary replacement can
    /// also fail with [`Error::Validation`] / [`Error::Storage`] like
    /// `create`.
    pub async fn update(
        &self,
        id: ArtifactId,
        patch: ArtifactPatch,
        new_binary: Option<Vec<u8>>,
        _caller: &Caller,
    ) -> Result<Artifact, Error> {
        let _guard = self.locks.acquire(id).await;

        let mut artifact = self
            .db
            .get_artifact(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("artifact {id}")))?;

        patch.apply(&mut artifact);

        if let Some(bytes) = new_binary {
            let size = bytes.len() as u64;
            if size > self.max_upload_bytes {
                return Err(StoreError::TooLarge {
                    size,
                    limit: self.max_upload_bytes,
                }
                .into());
            }
            let info = ipa::inspect(&bytes)?;
            if info.bundle_id != artifact.bundle_id {
                return Err(Error::Validation(format!(
                    "replacement binary is {}, artifact is {}",
                    info.bundle_id, artifact.bundle_id
                )));
            }
            self.blobs.put(id, &bytes).await?;
            artifact.size_bytes = size;
            artifact.checksum = blake3::hash(&bytes).to_hex().to_string();
            if let Some(min_os) = info.min_os_version {
                artifact.min_os_version = min_os;
            }
        }

        artifact.updated_at = chrono::Utc::now().timestamp_millis();
        self.db.update_artifact(artifact.clone()).await?;
        Ok(artifact)
    }

    /// Fetch one artifact.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id.
    pub async fn get(&self, id: ArtifactId) -> Result<Artifact, Error> {
        self.db
            .get_artifact(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("artifact {id}")))
    }

    /// Remove an artifact: blob, record, and its manifest version
    /// entries.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is already absent, so callers can
    /// detect stale references.
    pub async fn delete(&self, id: ArtifactId, _caller: &Caller) -> Result<(), Error> {
        let _guard = self.locks.acquire(id).await;

        let artifact = self
            .db
            .get_artifact(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("artifact {id}")))?;

        self.db.delete_artifact(id).await?;
        match self.blobs.delete(id).await {
            Ok(()) => {}
            Err(StoreError::Missing(_)) => {
                warn!(id = %id, "blob already absent while deleting artifact");
            }
            Err(e) => return Err(e.into()),
        }

        let direct = self.links_for(&artifact).direct;
        self.manifest
            .prune_artifact(&artifact.bundle_id, &direct)
            .await?;

        info!(id = %id, bundle = %artifact.bundle_id, "artifact deleted");
        Ok(())
    }

    /// All records plus used-vs-quota storage totals.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] when the catalog is unavailable.
    pub async fn list(&self) -> Result<RegistryListing, Error> {
        let artifacts = self.db.list_artifacts().await?;
        let used_bytes = artifacts.iter().map(|a| a.size_bytes).sum();
        Ok(RegistryListing {
            artifacts,
            totals: StorageTotals {
                used_bytes,
                quota_bytes: self.storage_quota_bytes,
            },
        })
    }

    /// The five published links of an artifact.
    pub fn links_for(&self, artifact: &Artifact) -> Links {
        links::derive(&self.base_url, artifact.id, &artifact.slug)
    }

    /// The OTA install manifest referenced by the artifact's install
    /// link.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id.
    pub async fn install_manifest(&self, id: ArtifactId) -> Result<Vec<u8>, Error> {
        let artifact = self.get(id).await?;
        let links = self.links_for(&artifact);
        let icon = if artifact.icon_url.is_empty() {
            None
        } else {
            Some(artifact.icon_url.clone())
        };
        InstallManifest::new(
            &artifact.bundle_id,
            &artifact.version,
            &artifact.app_name,
            links.direct,
            icon,
        )
        .to_xml()
        .map_err(|e| Error::Storage(format!("install manifest serialization: {e}")))
    }

    async fn used_bytes(&self) -> Result<u64, Error> {
        Ok(self
            .db
            .list_artifacts()
            .await?
            .iter()
            .map(|a| a.size_bytes)
            .sum())
    }
}
