//! Caller authentication precondition.
//!
//! Token validation itself belongs to an external collaborator; the
//! engine only insists that every mutating operation presents a
//! [`Caller`]. A `Caller` can only be produced by [`authenticate`], so
//! "unauthenticated mutation" is unrepresentable past this boundary.

use crate::error::Error;

/// External authentication collaborator.
pub trait TokenVerifier: Send + Sync {
    /// Whether the presented token names a valid caller.
    fn verify(&self, token: &str) -> bool;
}

/// Shared-secret verifier configured from the environment.
#[derive(Debug)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    /// Verifier accepting exactly this token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenVerifier for StaticToken {
    fn verify(&self, token: &str) -> bool {
        // Length-constant comparison is the auth service's concern;
        // this verifier only exists for single-operator deployments.
        !self.token.is_empty() && self.token == token
    }
}

/// Verifier for a trusted local operator (no token configured).
#[derive(Debug, Default)]
pub struct AllowAll;

impl TokenVerifier for AllowAll {
    fn verify(&self, _token: &str) -> bool {
        true
    }
}

/// Witness that a caller passed authentication.
#[derive(Debug, Clone)]
pub struct Caller {
    subject: String,
}

impl Caller {
    /// The authenticated subject, for audit logging.
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Validate a token against the external verifier.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the token is rejected; the engine
/// treats an unauthenticated caller as an input precondition failure.
pub fn authenticate(verifier: &dyn TokenVerifier, token: &str) -> Result<Caller, Error> {
    if verifier.verify(token) {
        Ok(Caller {
            subject: "operator".to_string(),
        })
    } else {
        Err(Error::Validation("unauthenticated caller".to_string()))
    }
}
