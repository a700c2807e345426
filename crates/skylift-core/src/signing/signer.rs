//! External re-signing capability.
//!
//! The actual signature work happens in an opaque external process with
//! a zsign-compatible flag surface. The trait keeps the pipeline
//! testable without real credentials.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use super::SignError;
use crate::types::Certificate;

/// Opaque re-signing capability: consume an IPA, emit a signed IPA.
#[async_trait]
pub trait Resigner: Send + Sync {
    /// Sign `input` into `output` with the certificate's credentials.
    ///
    /// # Errors
    ///
    /// Any [`SignError`]; the pipeline converts it into a `Failed` job
    /// without touching the artifact.
    async fn resign(
        &self,
        input: &Path,
        output: &Path,
        certificate: &Certificate,
    ) -> Result<(), SignError>;
}

/// Signer that shells out to an external command.
///
/// Invocation: `<program> -k <key> -m <profile> [-p <password>]
/// -o <output> <input>`.
#[derive(Debug, Clone)]
pub struct CommandSigner {
    program: String,
}

impl CommandSigner {
    /// Signer invoking the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Resigner for CommandSigner {
    async fn resign(
        &self,
        input: &Path,
        output: &Path,
        certificate: &Certificate,
    ) -> Result<(), SignError> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .arg("-k")
            .arg(&certificate.key_path)
            .arg("-m")
            .arg(&certificate.profile_path)
            .arg("-o")
            .arg(output);
        if let Some(password) = &certificate.password {
            command.arg("-p").arg(password);
        }
        command.arg(input);

        // The pipeline bounds this call with a timeout; make sure the
        // child dies with the future instead of signing on unattended.
        command.kill_on_drop(true);

        debug!(program = %self.program, input = %input.display(), "invoking signer");
        let result = command.output().await?;

        if result.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&result.stderr);
            Err(SignError::Signer(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            )))
        }
    }
}
