//! Component wiring.
//!
//! One [`Engine`] owns every component over shared collaborators: the
//! catalog actor, the blob store, the per-artifact lock table, the
//! manifest builder, and the signing worker.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{self, AllowAll, Caller, StaticToken, TokenVerifier};
use crate::certs::CertificateStore;
use crate::config::Config;
use crate::error::Error;
use crate::links::{HttpShortener, Shortener};
use crate::manifest::ManifestBuilder;
use crate::registry::{ArtifactLocks, Registry};
use crate::signing::{CommandSigner, Resigner, SigningPipeline};
use crate::store::blob::{BinaryStore, FsStore};
use crate::store::DbHandle;
use skylift_schema::repo::NewsItem;
use skylift_schema::{ArtifactId, RepositoryManifest};

/// The assembled engine.
pub struct Engine {
    /// Effective configuration.
    pub config: Config,
    /// Artifact registry.
    pub registry: Registry,
    /// Certificate store.
    pub certs: CertificateStore,
    /// Signing pipeline.
    pub pipeline: SigningPipeline,
    /// Repository manifest builder.
    pub manifest: Arc<ManifestBuilder>,
    /// URL shortener, when configured.
    pub shortener: Option<Arc<dyn Shortener>>,
    verifier: Arc<dyn TokenVerifier>,
}

impl Engine {
    /// Assemble the engine with default collaborators (filesystem blob
    /// store, command signer). Must be called from within a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] when the data directory or catalog cannot be
    /// opened.
    pub fn start(config: Config) -> Result<Self, Error> {
        Self::with_parts(config, None, None)
    }

    /// Assemble the engine, overriding the blob store and/or signer
    /// (used by tests and remote-store deployments).
    ///
    /// # Errors
    ///
    /// As for [`Engine::start`].
    pub fn with_parts(
        config: Config,
        blobs: Option<Arc<dyn BinaryStore>>,
        signer: Option<Arc<dyn Resigner>>,
    ) -> Result<Self, Error> {
        config
            .ensure_dirs()
            .map_err(|e| Error::Storage(format!("data directory: {e}")))?;

        let db = DbHandle::spawn(&config.db_path())?;
        let blobs = match blobs {
            Some(blobs) => blobs,
            None => Arc::new(FsStore::new(config.blobs_dir(), config.max_upload_bytes)?),
        };
        let signer: Arc<dyn Resigner> =
            signer.unwrap_or_else(|| Arc::new(CommandSigner::new(&config.signer_program)));

        let locks = Arc::new(ArtifactLocks::default());
        let manifest = Arc::new(ManifestBuilder::open(
            config.manifest_path(),
            RepositoryManifest::new(&config.repo_name, &config.repo_identifier),
        )?);

        let pipeline = SigningPipeline::spawn(
            db.clone(),
            blobs.clone(),
            signer,
            locks.clone(),
            config.tmp_dir(),
            Duration::from_secs(config.signer_timeout_secs),
        );
        let registry = Registry::new(db.clone(), blobs, manifest.clone(), locks, &config);
        let certs = CertificateStore::new(db, config.certs_dir());

        let shortener: Option<Arc<dyn Shortener>> = config.shortener_endpoint.as_ref().map(|e| {
            Arc::new(HttpShortener::new(e.clone(), config.shortener_timeout_secs))
                as Arc<dyn Shortener>
        });
        let verifier: Arc<dyn TokenVerifier> = match &config.api_token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => Arc::new(AllowAll),
        };

        Ok(Self {
            config,
            registry,
            certs,
            pipeline,
            manifest,
            shortener,
            verifier,
        })
    }

    /// Validate a caller token against the configured verifier.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a rejected token.
    pub fn authenticate(&self, token: &str) -> Result<Caller, Error> {
        auth::authenticate(&*self.verifier, token)
    }

    /// Merge one artifact snapshot into the repository manifest.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id, [`Error::Conflict`] when
    /// another writer changed the manifest (retry after a fresh read).
    pub async fn sync_artifact(
        &self,
        id: ArtifactId,
        _caller: &Caller,
    ) -> Result<RepositoryManifest, Error> {
        let artifact = self.registry.get(id).await?;
        let links = self.registry.links_for(&artifact);
        Ok(self.manifest.sync(&artifact, &links.direct).await?)
    }

    /// Insert or replace a news item in the repository manifest.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an item the schema rejects,
    /// [`Error::Conflict`] as for [`Engine::sync_artifact`].
    pub async fn upsert_news(
        &self,
        item: NewsItem,
        _caller: &Caller,
    ) -> Result<RepositoryManifest, Error> {
        Ok(self.manifest.upsert_news(item).await?)
    }

    /// Remove a news item from the repository manifest.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown identifier,
    /// [`Error::Conflict`] as for [`Engine::sync_artifact`].
    pub async fn remove_news(
        &self,
        identifier: &str,
        _caller: &Caller,
    ) -> Result<RepositoryManifest, Error> {
        Ok(self.manifest.remove_news(identifier).await?)
    }
}
