//! Repository manifest builder.
//!
//! The manifest is a separately persisted document, not a projection
//! recomputed from the registry on every read: an explicit `sync` merges
//! one artifact snapshot into it, which lets an operator stage metadata
//! edits before publishing them.
//!
//! Concurrency discipline: all mutations serialize on the builder's
//! mutex, and every commit first compares the blake3 fingerprint of the
//! document bytes it last read or wrote against the file on disk. A
//! mismatch means another writer got there first; the builder reloads
//! the on-disk document and reports `Conflict` so the caller retries
//! against fresh state. Two simultaneous syncs can therefore never each
//! write back a manifest missing the other's change. Commits go through
//! a temp file and an atomic rename, so a partially-written manifest is
//! never observable.

use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::types::Artifact;
use skylift_schema::repo::{AppEntry, AppVersion, ManifestOp, NewsItem, RepoError, RepositoryManifest};

/// Manifest persistence and mutation failures.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The document on disk or in memory does not serialize/parse.
    #[error("manifest encoding: {0}")]
    Json(#[from] serde_json::Error),

    /// The mutation or resulting document violates the schema.
    #[error(transparent)]
    Repo(#[from] RepoError),

    /// Concurrent mutation detected; retry with a fresh read.
    #[error("concurrent manifest mutation detected: {0}")]
    Conflict(String),
}

struct State {
    doc: RepositoryManifest,
    /// blake3 of the file bytes as last read or written; `None` when
    /// the file does not exist yet.
    fingerprint: Option<String>,
}

/// Owner of the repository manifest document.
pub struct ManifestBuilder {
    path: PathBuf,
    state: Mutex<State>,
}

impl ManifestBuilder {
    /// Load the manifest from disk, or start from the seed document if
    /// none exists yet. Nothing is written until the first mutation.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] / [`ManifestError::Json`] when an
    /// existing file cannot be read or parsed.
    pub fn open(path: PathBuf, seed: RepositoryManifest) -> Result<Self, ManifestError> {
        let state = match std::fs::read(&path) {
            Ok(bytes) => State {
                doc: serde_json::from_slice(&bytes)?,
                fingerprint: Some(fingerprint(&bytes)),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State {
                doc: seed,
                fingerprint: None,
            },
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Merge one artifact snapshot into the manifest.
    ///
    /// A new app is appended seeded from the artifact's metadata; an
    /// existing app gets the version prepended (or replaced on an exact
    /// version match), re-sorted newest first. Calling this twice for an
    /// unchanged artifact is idempotent.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Conflict`] when another writer changed the file;
    /// retry after the error.
    pub async fn sync(
        &self,
        artifact: &Artifact,
        download_url: &str,
    ) -> Result<RepositoryManifest, ManifestError> {
        let mut state = self.state.lock().await;
        self.reconcile(&mut state)?;

        let version = version_entry(artifact, download_url);
        let op = if state.doc.find_app(&artifact.bundle_id).is_some() {
            ManifestOp::AddVersion {
                bundle_identifier: artifact.bundle_id.clone(),
                version,
            }
        } else {
            let mut entry = app_entry(artifact);
            entry.versions.push(version);
            ManifestOp::AddApp(entry)
        };

        let mut next = state.doc.clone();
        next.apply(op)?;
        next.validate()?;
        let committed = self.commit(&mut state, next)?;
        info!(bundle = %artifact.bundle_id, version = %artifact.version, "artifact synced into repository");
        Ok(committed)
    }

    /// Remove every version entry whose download URL references a
    /// deleted artifact; an app left without versions is removed
    /// entirely.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Conflict`] as for [`ManifestBuilder::sync`].
    pub async fn prune_artifact(
        &self,
        bundle_identifier: &str,
        download_url: &str,
    ) -> Result<(), ManifestError> {
        let mut state = self.state.lock().await;
        self.reconcile(&mut state)?;

        let Some(app) = state.doc.find_app(bundle_identifier) else {
            return Ok(());
        };
        if !app.versions.iter().any(|v| v.download_url == download_url) {
            return Ok(());
        }

        let mut next = state.doc.clone();
        if let Some(app) = next
            .apps
            .iter_mut()
            .find(|a| a.bundle_identifier == bundle_identifier)
        {
            app.versions.retain(|v| v.download_url != download_url);
            if app.versions.is_empty() {
                next.apps
                    .retain(|a| a.bundle_identifier != bundle_identifier);
            }
        }
        next.validate()?;
        self.commit(&mut state, next)?;
        debug!(bundle = bundle_identifier, "pruned deleted artifact from repository");
        Ok(())
    }

    /// Insert or refresh an app entry directly (curated edits).
    ///
    /// # Errors
    ///
    /// As for [`ManifestBuilder::apply`].
    pub async fn upsert_app(&self, entry: AppEntry) -> Result<RepositoryManifest, ManifestError> {
        self.apply(ManifestOp::AddApp(entry)).await
    }

    /// Remove an app and all its versions.
    ///
    /// # Errors
    ///
    /// As for [`ManifestBuilder::apply`].
    pub async fn remove_app(
        &self,
        bundle_identifier: &str,
    ) -> Result<RepositoryManifest, ManifestError> {
        self.apply(ManifestOp::RemoveApp {
            bundle_identifier: bundle_identifier.to_string(),
        })
        .await
    }

    /// Insert or replace a news item.
    ///
    /// # Errors
    ///
    /// As for [`ManifestBuilder::apply`].
    pub async fn upsert_news(&self, item: NewsItem) -> Result<RepositoryManifest, ManifestError> {
        self.apply(ManifestOp::AddNews(item)).await
    }

    /// Remove a news item.
    ///
    /// # Errors
    ///
    /// As for [`ManifestBuilder::apply`].
    pub async fn remove_news(&self, identifier: &str) -> Result<RepositoryManifest, ManifestError> {
        self.apply(ManifestOp::RemoveNews {
            identifier: identifier.to_string(),
        })
        .await
    }

    /// Apply one tagged mutation and commit the result.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Repo`] when the op or resulting document is
    /// invalid (the document on disk is left untouched),
    /// [`ManifestError::Conflict`] when another writer interfered.
    pub async fn apply(&self, op: ManifestOp) -> Result<RepositoryManifest, ManifestError> {
        let mut state = self.state.lock().await;
        self.reconcile(&mut state)?;

        let mut next = state.doc.clone();
        next.apply(op)?;
        next.validate()?;
        self.commit(&mut state, next)
    }

    /// The current in-memory document.
    pub async fn snapshot(&self) -> RepositoryManifest {
        self.state.lock().await.doc.clone()
    }

    /// Serialize the current document for serving, validating first; an
    /// invalid document is never rendered.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Repo`] when the document is not servable.
    pub async fn render(&self) -> Result<String, ManifestError> {
        let state = self.state.lock().await;
        state.doc.validate()?;
        Ok(serde_json::to_string_pretty(&state.doc)?)
    }

    /// Detect an out-of-band writer. On mismatch the on-disk document
    /// replaces the in-memory one so the caller's retry sees fresh
    /// state.
    fn reconcile(&self, state: &mut State) -> Result<(), ManifestError> {
        let on_disk = match std::fs::read(&self.path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let disk_fingerprint = on_disk.as_deref().map(fingerprint);
        if disk_fingerprint == state.fingerprint {
            return Ok(());
        }

        if let Some(bytes) = on_disk {
            state.doc = serde_json::from_slice(&bytes)?;
        }
        state.fingerprint = disk_fingerprint;
        Err(ManifestError::Conflict(
            "repository manifest changed on disk; retry against the fresh document".to_string(),
        ))
    }

    /// Write the document via temp file + atomic rename and adopt it as
    /// the current state.
    fn commit(
        &self,
        state: &mut State,
        next: RepositoryManifest,
    ) -> Result<RepositoryManifest, ManifestError> {
        let bytes = serde_json::to_vec_pretty(&next)?;
        let dir = self
            .path
            .parent()
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        state.fingerprint = Some(fingerprint(&bytes));
        state.doc = next.clone();
        Ok(next)
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn version_entry(artifact: &Artifact, download_url: &str) -> AppVersion {
    AppVersion {
        version: artifact.version.clone(),
        date: rfc3339(artifact.updated_at),
        size: artifact.size_bytes,
        download_url: download_url.to_string(),
        localized_description: artifact.changelog.clone(),
        min_os_version: artifact.min_os_version.clone(),
    }
}

fn app_entry(artifact: &Artifact) -> AppEntry {
    AppEntry {
        name: artifact.app_name.clone(),
        bundle_identifier: artifact.bundle_id.clone(),
        developer_name: if artifact.developer.is_empty() {
            artifact.app_name.clone()
        } else {
            artifact.developer.clone()
        },
        subtitle: String::new(),
        localized_description: if artifact.description.is_empty() {
            artifact.app_name.clone()
        } else {
            artifact.description.clone()
        },
        icon_url: artifact.icon_url.clone(),
        tint_color: String::new(),
        screenshot_urls: artifact.screenshot_urls.clone(),
        versions: Vec::new(),
        app_permissions: None,
    }
}

/// Millisecond precision keeps version dates distinct even for uploads
/// landing within the same second, so the newest-first order is stable.
fn rfc3339(unix_millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(unix_millis)
        .unwrap_or_default()
        .to_rfc3339()
}
