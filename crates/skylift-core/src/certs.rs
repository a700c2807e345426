//! Certificate store.
//!
//! Catalogs signing identities: a private-key bundle plus a provisioning
//! profile, written under `certs/<dir>/` with the catalog row pointing at
//! them. Cryptographic well-formedness is not checked here; the signer
//! rejects bad credentials at sign time. Prefer deactivating over
//! deleting - deletion removes the credential files and is irreversible.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::auth::Caller;
use crate::error::Error;
use crate::links::slugify;
use crate::store::DbHandle;
use crate::types::{Certificate, CertificatePatch};

/// Catalog of signing identities.
pub struct CertificateStore {
    db: DbHandle,
    dir: PathBuf,
}

impl CertificateStore {
    /// Wire the store over the catalog and its credentials directory.
    pub fn new(db: DbHandle, dir: PathBuf) -> Self {
        Self { db, dir }
    }

    /// Register a signing identity from its two credential files.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when either file is missing or empty,
    /// [`Error::Storage`] when the files cannot be written.
    pub async fn create(
        &self,
        name: &str,
        key_bundle: &[u8],
        provisioning_profile: &[u8],
        password: Option<String>,
        description: Option<String>,
        _caller: &Caller,
    ) -> Result<Certificate, Error> {
        if name.is_empty() {
            return Err(Error::Validation("certificate name is required".to_string()));
        }
        if key_bundle.is_empty() {
            return Err(Error::Validation("key bundle file is required".to_string()));
        }
        if provisioning_profile.is_empty() {
            return Err(Error::Validation(
                "provisioning profile file is required".to_string(),
            ));
        }

        let now = chrono::Utc::now();
        let cert_dir = self
            .dir
            .join(format!("{}-{}", now.timestamp_millis(), slugify(name)));
        std::fs::create_dir_all(&cert_dir).map_err(|e| Error::Storage(e.to_string()))?;

        let key_path = cert_dir.join("key.p12");
        let profile_path = cert_dir.join("profile.mobileprovision");
        let write = |path: &PathBuf, bytes: &[u8]| {
            std::fs::write(path, bytes).map_err(|e| Error::Storage(e.to_string()))
        };
        if let Err(e) = write(&key_path, key_bundle).and_then(|()| write(&profile_path, provisioning_profile)) {
            std::fs::remove_dir_all(&cert_dir).ok();
            return Err(e);
        }

        let certificate = Certificate {
            id: 0,
            name: name.to_string(),
            key_path: key_path.to_string_lossy().into_owned(),
            profile_path: profile_path.to_string_lossy().into_owned(),
            password,
            is_active: true,
            description: description.unwrap_or_default(),
            created_at: now.timestamp_millis(),
        };
        let created = match self.db.insert_certificate(certificate).await {
            Ok(created) => created,
            Err(e) => {
                std::fs::remove_dir_all(&cert_dir).ok();
                return Err(e.into());
            }
        };

        info!(id = created.id, name = %created.name, "certificate registered");
        Ok(created)
    }

    /// Merge a patch into a certificate record.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id.
    pub async fn update(
        &self,
        id: i64,
        patch: CertificatePatch,
        _caller: &Caller,
    ) -> Result<Certificate, Error> {
        let mut certificate = self
            .db
            .get_certificate(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("certificate {id}")))?;

        if let Some(name) = patch.name {
            certificate.name = name;
        }
        if let Some(description) = patch.description {
            certificate.description = description;
        }
        if let Some(password) = patch.password {
            certificate.password = Some(password);
        }
        if let Some(is_active) = patch.is_active {
            certificate.is_active = is_active;
        }

        self.db.update_certificate(certificate.clone()).await?;
        Ok(certificate)
    }

    /// Fetch one certificate.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id.
    pub async fn get(&self, id: i64) -> Result<Certificate, Error> {
        self.db
            .get_certificate(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("certificate {id}")))
    }

    /// Remove a certificate and its credential files.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id.
    pub async fn delete(&self, id: i64, _caller: &Caller) -> Result<(), Error> {
        let certificate = self
            .db
            .get_certificate(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("certificate {id}")))?;

        self.db.delete_certificate(id).await?;

        if let Some(parent) = PathBuf::from(&certificate.key_path).parent() {
            if let Err(e) = std::fs::remove_dir_all(parent) {
                warn!(id, error = %e, "credential files could not be removed");
            }
        }
        info!(id, name = %certificate.name, "certificate deleted");
        Ok(())
    }

    /// All certificates, optionally only the active ones.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] when the catalog is unavailable.
    pub async fn list(&self, active_only: bool) -> Result<Vec<Certificate>, Error> {
        Ok(self.db.list_certificates(active_only).await?)
    }
}
