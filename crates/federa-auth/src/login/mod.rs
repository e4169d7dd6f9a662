//! Credential-exchange login protocol.
//!
//! Used by backends that collect an identifier and a secret through a local
//! form instead of redirecting to the provider:
//!
//! 1. The form is rendered ([`FormSpec`]) and validated on POST
//! 2. The attempt counter is incremented; past the threshold the login is
//!    locked without contacting the remote system
//! 3. The remote API is called with a bounded timeout ([`CredentialVerifier`])
//! 4. On acceptance the counter is reset and the API body goes on to the
//!    pipeline's identity stages

mod client;
mod exchange;
mod form;
mod state;

pub use client::{CredentialVerifier, HttpCredentialVerifier};
pub use exchange::CredentialExchange;
pub use form::{FieldError, FieldSpec, FormErrors, FormSpec};
pub use state::LoginState;

/// Backend-local failure of a credential login.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// Too many attempts within the window.
    #[error("Too many login attempts")]
    Locked,

    /// The remote system reported invalid credentials.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The remote system failed, timed out or answered garbage.
    #[error("Backend {backend} unavailable: {reason}")]
    Unavailable {
        /// The backend name.
        backend: String,
        /// Diagnostic detail for logs.
        reason: String,
    },
}

impl CredentialError {
    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }
}
