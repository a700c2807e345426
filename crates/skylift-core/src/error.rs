//! Operation-surface error taxonomy.
//!
//! Module-level errors (`StoreError`, `DbError`, `SignError`, ...) stay
//! close to the code that raises them; this enum is what the engine's
//! public operations return, and it is what callers dispatch on:
//!
//! - `Validation` / `NotFound`: bad input or stale reference, not retried
//! - `Storage`: the binary store or catalog misbehaved; retryable
//! - `Signing`: the external signer failed or timed out; re-signing is a
//!   deliberate caller action, never automatic
//! - `Conflict`: concurrent manifest mutation detected; retry with a
//!   fresh read
//! - `Upstream`: a best-effort collaborator failed; operations degrade
//!   rather than surface this as a hard failure

use thiserror::Error;

use crate::links::UpstreamError;
use crate::manifest::ManifestError;
use crate::signing::SignError;
use crate::store::blob::StoreError;
use crate::store::db::DbError;
use skylift_schema::repo::RepoError;

/// Errors returned by engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing input; surfaced verbatim to the caller.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown identifier; lets callers detect stale references.
    #[error("not found: {0}")]
    NotFound(String),

    /// The binary store or catalog could not complete the operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// The external signer failed, mismatched, or timed out.
    #[error("signing failed: {0}")]
    Signing(#[from] SignError),

    /// Concurrent manifest mutation detected; retry with a fresh read.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A best-effort upstream collaborator failed.
    #[error("upstream service failed: {0}")]
    Upstream(String),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Missing(what) => Self::NotFound(what),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ArtifactNotFound(id) => Self::NotFound(format!("artifact {id}")),
            DbError::CertificateNotFound(id) => Self::NotFound(format!("certificate {id}")),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<ManifestError> for Error {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::Conflict(msg) => Self::Conflict(msg),
            ManifestError::Repo(RepoError::UnknownApp(id)) => Self::NotFound(format!("app {id}")),
            ManifestError::Repo(RepoError::UnknownNews(id)) => {
                Self::NotFound(format!("news item {id}"))
            }
            ManifestError::Repo(repo) => Self::Validation(repo.to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<UpstreamError> for Error {
    fn from(err: UpstreamError) -> Self {
        Self::Upstream(err.to_string())
    }
}
