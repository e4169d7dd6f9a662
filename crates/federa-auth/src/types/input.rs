//! Raw inbound data for one authentication transaction.

use std::fmt;

/// What the caller hands to [`Pipeline::authenticate`].
///
/// [`Pipeline::authenticate`]: crate::pipeline::Pipeline::authenticate
#[derive(Debug, Clone)]
pub enum AuthInput {
    /// Provider response delivered by a federation or OAuth2 callback.
    Response(serde_json::Value),

    /// Identifier and secret submitted through a credential backend's form.
    Credentials(Credentials),
}

impl AuthInput {
    /// Short name of the input kind, used in errors and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Response(_) => "provider response",
            Self::Credentials(_) => "credentials",
        }
    }
}

impl From<Credentials> for AuthInput {
    fn from(credentials: Credentials) -> Self {
        Self::Credentials(credentials)
    }
}

/// An identifier and secret pair, trimmed on construction.
///
/// Either half may still be empty; the pipeline refuses such pairs before
/// they reach the rate limiter or the remote API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The identifier (card number, username).
    pub identifier: String,
    /// The secret (PIN, password).
    pub secret: String,
}

impl Credentials {
    /// Creates credentials, trimming surrounding whitespace.
    #[must_use]
    pub fn new(identifier: impl AsRef<str>, secret: impl AsRef<str>) -> Self {
        Self {
            identifier: identifier.as_ref().trim().to_string(),
            secret: secret.as_ref().trim().to_string(),
        }
    }

    /// Returns `true` if both the identifier and the secret are non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.identifier.is_empty() && !self.secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
