//! Signing pipeline.
//!
//! A sign request moves through `Requested -> InProgress -> Signed |
//! Failed`. The external signer is slow (seconds to tens of seconds), so
//! requests are handed to a worker task over a channel and observed
//! through the state machine; registry CRUD on other artifacts never
//! queues behind an in-flight sign. On success the signed binary
//! atomically replaces the stored bytes under the same artifact id and
//! `signed_at` is set; on any failure the artifact is left untouched.
//!
//! Re-running a sign on an already-signed artifact is permitted and
//! simply repeats the transition.

pub mod signer;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{info, warn};

use crate::auth::Caller;
use crate::error::Error;
use crate::registry::ArtifactLocks;
use crate::store::DbHandle;
use crate::store::blob::BinaryStore;
use skylift_schema::ArtifactId;

pub use signer::{CommandSigner, Resigner};

/// Identifier of one sign request.
pub type JobId = u64;

/// State machine of one sign request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignState {
    /// Queued, not yet picked up by the worker.
    Requested,
    /// The external signer is running.
    InProgress,
    /// The signed binary replaced the stored bytes.
    Signed,
    /// The signer failed; the artifact is untouched.
    Failed(String),
}

impl SignState {
    /// Whether the job has finished, either way.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Signed | Self::Failed(_))
    }
}

/// Why a sign failed.
#[derive(Error, Debug)]
pub enum SignError {
    /// Scratch-file I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The signer did not finish within the bound.
    #[error("signer timed out after {0}s")]
    Timeout(u64),

    /// The signer rejected the package or credentials.
    #[error("{0}")]
    Signer(String),

    /// The selected certificate is not offered for signing.
    #[error("certificate {0} is not active")]
    CertificateInactive(i64),

    /// The artifact was deleted while the job was queued.
    #[error("artifact {0} no longer exists")]
    ArtifactGone(String),

    /// The blob store or catalog failed mid-sign.
    #[error("storage failure during signing: {0}")]
    Store(String),

    /// The pipeline worker is gone.
    #[error("signing worker is no longer running")]
    WorkerGone,
}

struct SignRequest {
    job: JobId,
    artifact: ArtifactId,
    certificate: i64,
}

type JobTable = Arc<Mutex<HashMap<JobId, watch::Sender<SignState>>>>;

/// Handle to the signing worker.
pub struct SigningPipeline {
    tx: mpsc::Sender<SignRequest>,
    jobs: JobTable,
    next_job: AtomicU64,
    db: DbHandle,
}

impl SigningPipeline {
    /// Spawn the worker task. Must be called from within a tokio
    /// runtime.
    pub fn spawn(
        db: DbHandle,
        blobs: Arc<dyn BinaryStore>,
        signer: Arc<dyn Resigner>,
        locks: Arc<ArtifactLocks>,
        tmp_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let jobs: JobTable = Arc::new(Mutex::new(HashMap::new()));

        let worker = Worker {
            db: db.clone(),
            blobs,
            signer,
            locks,
            tmp_dir,
            timeout,
        };
        tokio::spawn(worker.run(rx, jobs.clone()));

        Self {
            tx,
            jobs,
            next_job: AtomicU64::new(0),
            db,
        }
    }

    /// Queue a sign of one artifact with one certificate.
    ///
    /// Preconditions are checked here so the caller learns about a bad
    /// request immediately rather than from a failed job.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown artifact or certificate,
    /// [`Error::Signing`] when the certificate is inactive or the worker
    /// is gone.
    pub async fn submit(
        &self,
        artifact: ArtifactId,
        certificate: i64,
        _caller: &Caller,
    ) -> Result<JobId, Error> {
        let cert = self
            .db
            .get_certificate(certificate)
            .await?
            .ok_or_else(|| Error::NotFound(format!("certificate {certificate}")))?;
        if !cert.is_active {
            return Err(SignError::CertificateInactive(certificate).into());
        }
        self.db
            .get_artifact(artifact)
            .await?
            .ok_or_else(|| Error::NotFound(format!("artifact {artifact}")))?;

        let job = self.next_job.fetch_add(1, Ordering::Relaxed) + 1;
        let (state_tx, _state_rx) = watch::channel(SignState::Requested);
        self.jobs.lock().await.insert(job, state_tx);

        self.tx
            .send(SignRequest {
                job,
                artifact,
                certificate,
            })
            .await
            .map_err(|_| Error::Signing(SignError::WorkerGone))?;

        Ok(job)
    }

    /// Observe the state machine of one job.
    pub async fn status(&self, job: JobId) -> Option<SignState> {
        self.jobs
            .lock()
            .await
            .get(&job)
            .map(|tx| tx.borrow().clone())
    }

    /// Wait for a job to reach a terminal state.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown job id, [`Error::Signing`]
    /// when the worker dies mid-job.
    pub async fn wait(&self, job: JobId) -> Result<SignState, Error> {
        let mut rx = self
            .jobs
            .lock()
            .await
            .get(&job)
            .map(watch::Sender::subscribe)
            .ok_or_else(|| Error::NotFound(format!("sign job {job}")))?;

        loop {
            let state = rx.borrow_and_update().clone();
            if state.is_terminal() {
                return Ok(state);
            }
            rx.changed()
                .await
                .map_err(|_| Error::Signing(SignError::WorkerGone))?;
        }
    }

    /// Submit a sign and wait for it, converting a failed job into an
    /// error.
    ///
    /// # Errors
    ///
    /// As [`SigningPipeline::submit`] and [`SigningPipeline::wait`],
    /// plus [`Error::Signing`] carrying the failure reason.
    pub async fn sign(
        &self,
        artifact: ArtifactId,
        certificate: i64,
        caller: &Caller,
    ) -> Result<(), Error> {
        let job = self.submit(artifact, certificate, caller).await?;
        match self.wait(job).await? {
            SignState::Signed => Ok(()),
            SignState::Failed(reason) => Err(Error::Signing(SignError::Signer(reason))),
            state => Err(Error::Signing(SignError::Signer(format!(
                "job ended in non-terminal state {state:?}"
            )))),
        }
    }
}

struct Worker {
    db: DbHandle,
    blobs: Arc<dyn BinaryStore>,
    signer: Arc<dyn Resigner>,
    locks: Arc<ArtifactLocks>,
    tmp_dir: PathBuf,
    timeout: Duration,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<SignRequest>, jobs: JobTable) {
        while let Some(request) = rx.recv().await {
            set_state(&jobs, request.job, SignState::InProgress).await;
            match self.process(request.artifact, request.certificate).await {
                Ok(()) => {
                    info!(job = request.job, artifact = %request.artifact, "sign complete");
                    set_state(&jobs, request.job, SignState::Signed).await;
                }
                Err(e) => {
                    warn!(job = request.job, artifact = %request.artifact, error = %e, "sign failed");
                    set_state(&jobs, request.job, SignState::Failed(e.to_string())).await;
                }
            }
        }
    }

    async fn process(&self, artifact_id: ArtifactId, certificate: i64) -> Result<(), SignError> {
        // Serialize against metadata edits and binary replacement on
        // the same artifact; other artifacts proceed unimpeded.
        let _guard = self.locks.acquire(artifact_id).await;

        let cert = self
            .db
            .get_certificate(certificate)
            .await
            .map_err(|e| SignError::Store(e.to_string()))?
            .ok_or_else(|| SignError::Store(format!("certificate {certificate} disappeared")))?;
        if !cert.is_active {
            return Err(SignError::CertificateInactive(certificate));
        }

        self.db
            .get_artifact(artifact_id)
            .await
            .map_err(|e| SignError::Store(e.to_string()))?
            .ok_or_else(|| SignError::ArtifactGone(artifact_id.to_string()))?;

        let bytes = self
            .blobs
            .get(artifact_id)
            .await
            .map_err(|e| SignError::Store(e.to_string()))?;

        // TempDir cleans itself up on every exit path, so a failed or
        // crashed sign leaves no orphaned scratch state.
        std::fs::create_dir_all(&self.tmp_dir)?;
        let work = tempfile::Builder::new()
            .prefix("sign-")
            .tempdir_in(&self.tmp_dir)?;
        let input = work.path().join("input.ipa");
        let output = work.path().join("signed.ipa");
        std::fs::write(&input, &bytes)?;

        tokio::time::timeout(self.timeout, self.signer.resign(&input, &output, &cert))
            .await
            .map_err(|_| SignError::Timeout(self.timeout.as_secs()))??;

        let signed = std::fs::read(&output)
            .map_err(|_| SignError::Signer("signer produced no output package".to_string()))?;
        if signed.is_empty() {
            return Err(SignError::Signer(
                "signer produced an empty package".to_string(),
            ));
        }

        // Swap the binary first (atomic rename), then record the sign.
        // A crash between the two leaves a signed binary with a stale
        // signed_at, which an explicit re-sign repairs.
        let checksum = blake3::hash(&signed).to_hex().to_string();
        self.blobs
            .put(artifact_id, &signed)
            .await
            .map_err(|e| SignError::Store(e.to_string()))?;
        self.db
            .mark_signed(
                artifact_id,
                chrono::Utc::now().timestamp_millis(),
                checksum,
                signed.len() as u64,
            )
            .await
            .map_err(|e| SignError::Store(e.to_string()))?;

        Ok(())
    }
}

async fn set_state(jobs: &JobTable, job: JobId, state: SignState) {
    if let Some(tx) = jobs.lock().await.get(&job) {
        tx.send_replace(state);
    }
}
