//! Catalog actor - thread-safe access to SQLite.
//!
//! SQLite connections are not `Sync`, so the catalog handle lives on a
//! dedicated background thread and the rest of the engine talks to it
//! via message passing. The actor also gives the registry its ordering
//! guarantee: catalog mutations are applied one at a time, in arrival
//! order, while the slow signer work stays out on the pipeline worker.

use std::path::Path;
use std::sync::mpsc;
use std::thread;

use tokio::sync::oneshot;

use super::db::{DbError, RegistryDb};
use crate::types::{Artifact, Certificate};
use skylift_schema::ArtifactId;

/// Events the catalog actor accepts.
enum DbEvent {
    InsertArtifact {
        artifact: Artifact,
        resp: oneshot::Sender<Result<Artifact, DbError>>,
    },
    GetArtifact {
        id: ArtifactId,
        resp: oneshot::Sender<Result<Option<Artifact>, DbError>>,
    },
    UpdateArtifact {
        artifact: Artifact,
        resp: oneshot::Sender<Result<(), DbError>>,
    },
    MarkSigned {
        id: ArtifactId,
        signed_at: i64,
        checksum: String,
        size_bytes: u64,
        resp: oneshot::Sender<Result<(), DbError>>,
    },
    DeleteArtifact {
        id: ArtifactId,
        resp: oneshot::Sender<Result<(), DbError>>,
    },
    ListArtifacts {
        resp: oneshot::Sender<Result<Vec<Artifact>, DbError>>,
    },
    InsertCertificate {
        certificate: Certificate,
        resp: oneshot::Sender<Result<Certificate, DbError>>,
    },
    GetCertificate {
        id: i64,
        resp: oneshot::Sender<Result<Option<Certificate>, DbError>>,
    },
    UpdateCertificate {
        certificate: Certificate,
        resp: oneshot::Sender<Result<(), DbError>>,
    },
    DeleteCertificate {
        id: i64,
        resp: oneshot::Sender<Result<(), DbError>>,
    },
    ListCertificates {
        active_only: bool,
        resp: oneshot::Sender<Result<Vec<Certificate>, DbError>>,
    },
}

/// A handle to the catalog actor that is `Send + Sync + Clone`.
#[derive(Clone)]
pub struct DbHandle {
    sender: mpsc::Sender<DbEvent>,
}

impl DbHandle {
    /// Open the catalog and spawn its actor thread.
    ///
    /// # Errors
    ///
    /// Returns the catalog open failure.
    pub fn spawn(path: &Path) -> Result<Self, DbError> {
        let (sender, receiver) = mpsc::channel();
        let db = RegistryDb::open_at(path)?;

        thread::spawn(move || {
            run_db_event_loop(&db, &receiver);
        });

        Ok(Self { sender })
    }

    /// Send a request and wait for the response.
    async fn request<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(oneshot::Sender<Result<T, DbError>>) -> DbEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.sender.send(f(tx)).map_err(|_| DbError::ActorDied)?;
        rx.await.map_err(|_| DbError::ActorDied)?
    }

    /// Insert an artifact, resolving id collisions. Returns the record
    /// with the id actually used.
    pub async fn insert_artifact(&self, artifact: Artifact) -> Result<Artifact, DbError> {
        self.request(|resp| DbEvent::InsertArtifact { artifact, resp })
            .await
    }

    /// Fetch one artifact.
    pub async fn get_artifact(&self, id: ArtifactId) -> Result<Option<Artifact>, DbError> {
        self.request(|resp| DbEvent::GetArtifact { id, resp }).await
    }

    /// Rewrite an artifact row.
    pub async fn update_artifact(&self, artifact: Artifact) -> Result<(), DbError> {
        self.request(|resp| DbEvent::UpdateArtifact { artifact, resp })
            .await
    }

    /// Record a successful sign.
    pub async fn mark_signed(
        &self,
        id: ArtifactId,
        signed_at: i64,
        checksum: String,
        size_bytes: u64,
    ) -> Result<(), DbError> {
        self.request(|resp| DbEvent::MarkSigned {
            id,
            signed_at,
            checksum,
            size_bytes,
            resp,
        })
        .await
    }

    /// Delete one artifact row.
    pub async fn delete_artifact(&self, id: ArtifactId) -> Result<(), DbError> {
        self.request(|resp| DbEvent::DeleteArtifact { id, resp })
            .await
    }

    /// All artifacts, oldest upload first.
    pub async fn list_artifacts(&self) -> Result<Vec<Artifact>, DbError> {
        self.request(|resp| DbEvent::ListArtifacts { resp }).await
    }

    /// Insert a certificate; the catalog assigns the id.
    pub async fn insert_certificate(&self, certificate: Certificate) -> Result<Certificate, DbError> {
        self.request(|resp| DbEvent::InsertCertificate { certificate, resp })
            .await
    }

    /// Fetch one certificate.
    pub async fn get_certificate(&self, id: i64) -> Result<Option<Certificate>, DbError> {
        self.request(|resp| DbEvent::GetCertificate { id, resp })
            .await
    }

    /// Rewrite a certificate row.
    pub async fn update_certificate(&self, certificate: Certificate) -> Result<(), DbError> {
        self.request(|resp| DbEvent::UpdateCertificate { certificate, resp })
            .await
    }

    /// Delete one certificate row.
    pub async fn delete_certificate(&self, id: i64) -> Result<(), DbError> {
        self.request(|resp| DbEvent::DeleteCertificate { id, resp })
            .await
    }

    /// All certificates, optionally only the active ones.
    pub async fn list_certificates(&self, active_only: bool) -> Result<Vec<Certificate>, DbError> {
        self.request(|resp| DbEvent::ListCertificates { active_only, resp })
            .await
    }
}

/// The event loop running on the actor thread.
fn run_db_event_loop(db: &RegistryDb, receiver: &mpsc::Receiver<DbEvent>) {
    while let Ok(event) = receiver.recv() {
        match event {
            DbEvent::InsertArtifact { artifact, resp } => {
                let _ = resp.send(db.insert_artifact(artifact));
            }
            DbEvent::GetArtifact { id, resp } => {
                let _ = resp.send(db.get_artifact(id));
            }
            DbEvent::UpdateArtifact { artifact, resp } => {
                let _ = resp.send(db.update_artifact(&artifact));
            }
            DbEvent::MarkSigned {
                id,
                signed_at,
                checksum,
                size_bytes,
                resp,
            } => {
                let _ = resp.send(db.mark_signed(id, signed_at, &checksum, size_bytes));
            }
            DbEvent::DeleteArtifact { id, resp } => {
                let _ = resp.send(db.delete_artifact(id));
            }
            DbEvent::ListArtifacts { resp } => {
                let _ = resp.send(db.list_artifacts());
            }
            DbEvent::InsertCertificate { certificate, resp } => {
                let _ = resp.send(db.insert_certificate(&certificate));
            }
            DbEvent::GetCertificate { id, resp } => {
                let _ = resp.send(db.get_certificate(id));
            }
            DbEvent::UpdateCertificate { certificate, resp } => {
                let _ = resp.send(db.update_certificate(&certificate));
            }
            DbEvent::DeleteCertificate { id, resp } => {
                let _ = resp.send(db.delete_certificate(id));
            }
            DbEvent::ListCertificates { active_only, resp } => {
                let _ = resp.send(db.list_certificates(active_only));
            }
        }
    }
}
