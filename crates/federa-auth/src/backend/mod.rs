//! Provider backends.
//!
//! A backend is one external identity source together with its protocol
//! adapter. The pipeline only talks to backends through [`ProviderBackend`],
//! so new sources can be added without touching the stage list.
//!
//! # Variants
//!
//! - [`FederationBackend`] - SAML-style assertions with attribute URIs
//! - [`OAuth2Backend`] - token-exchange providers returning plain JSON claims
//! - [`CredentialBackend`] - identifier and secret exchanged with a remote API
//!
//! Narrower variants (e.g. a students-only federation) are built by
//! composition: a base backend plus an [`AccessRule`].

mod access;
mod credential;
mod error;
mod federation;
mod mapping;
mod oauth2;
mod registry;

use std::fmt;

use serde_json::Value;

use crate::types::AuthDetails;

pub use access::{AccessDecision, AccessRule};
pub use credential::{CredentialBackend, CredentialProtocol, RequestEncoding};
pub use error::NormalizationError;
pub use federation::{FederationBackend, turku_attributes};
pub use mapping::AttributeMapping;
pub use oauth2::OAuth2Backend;
pub use registry::{BackendRegistry, RegisteredBackend};

/// Broad protocol family of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Signed assertion delivered by a federation endpoint.
    Federation,
    /// OAuth2-style provider JSON.
    OAuth2,
    /// Local form plus a remote verification API.
    Credential,
}

impl BackendKind {
    /// Returns the configuration name of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Federation => "federation",
            Self::OAuth2 => "oauth2",
            Self::Credential => "credential",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One external identity source.
///
/// `details` and `provider_uid` must be pure functions of the response: no
/// I/O, no clock, no shared mutable state. Anything a backend needs from the
/// network happens before normalization (see [`crate::login`]).
pub trait ProviderBackend: Send + Sync + fmt::Debug {
    /// Unique backend name, e.g. `koha` or `turku_adfs`.
    fn name(&self) -> &str;

    /// Protocol family.
    fn kind(&self) -> BackendKind;

    /// Extracts normalized details from a provider response.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizationError::InvalidResponse`] when the response is
    /// not shaped as expected.
    fn details(&self, response: &Value) -> Result<AuthDetails, NormalizationError>;

    /// Extracts the backend-scoped unique identifier.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizationError::MissingIdentifier`] when the designated
    /// attribute is absent or not usable as an identifier.
    fn provider_uid(&self, response: &Value) -> Result<String, NormalizationError>;

    /// Both halves of normalization in one call.
    ///
    /// # Errors
    ///
    /// Returns the first error of [`details`](Self::details) or
    /// [`provider_uid`](Self::provider_uid).
    fn normalize(&self, response: &Value) -> Result<(String, AuthDetails), NormalizationError> {
        let details = self.details(response)?;
        let uid = self.provider_uid(response)?;
        Ok((uid, details))
    }

    /// Whether a login without an email address must be refused.
    fn is_email_required(&self) -> bool {
        false
    }

    /// Access policy for this backend. Allows everyone by default.
    fn check_access(&self, _details: &AuthDetails) -> AccessDecision {
        AccessDecision::Allow
    }

    /// The credential exchange settings, for credential backends.
    fn as_credential(&self) -> Option<&CredentialBackend> {
        None
    }

    /// The federation settings, for federation backends.
    fn as_federation(&self) -> Option<&FederationBackend> {
        None
    }
}

/// Object of a provider response, or an `InvalidResponse` error.
pub(crate) fn response_object<'a>(
    backend: &str,
    response: &'a Value,
) -> Result<&'a serde_json::Map<String, Value>, NormalizationError> {
    response
        .as_object()
        .ok_or_else(|| NormalizationError::invalid_response(backend, "expected a JSON object"))
}

/// Uid from a scalar string or number attribute.
pub(crate) fn scalar_uid(
    backend: &str,
    attrs: &serde_json::Map<String, Value>,
    attribute: &str,
) -> Result<String, NormalizationError> {
    let uid = match attrs.get(attribute) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if uid.is_empty() {
        return Err(NormalizationError::missing_identifier(backend, attribute));
    }
    Ok(uid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Echo;

    impl ProviderBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn kind(&self) -> BackendKind {
            BackendKind::OAuth2
        }

        fn details(&self, _response: &Value) -> Result<AuthDetails, NormalizationError> {
            Ok(AuthDetails::default())
        }

        fn provider_uid(&self, response: &Value) -> Result<String, NormalizationError> {
            scalar_uid("echo", response_object("echo", response)?, "id")
        }
    }

    #[test]
    fn test_trait_defaults() {
        let backend = Echo;
        assert!(backend.check_access(&AuthDetails::default()).is_allowed());
        assert!(!backend.is_email_required());
        assert!(backend.as_credential().is_none());
        assert!(backend.as_federation().is_none());

        let (uid, _) = backend
            .normalize(&serde_json::json!({"id": " 42 "}))
            .unwrap();
        assert_eq!(uid, "42");
    }
}
