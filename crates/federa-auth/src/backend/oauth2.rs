//! OAuth2-style backends normalizing provider JSON directly.

use serde_json::Value;

use super::{
    AccessDecision, AccessRule, AttributeMapping, BackendKind, NormalizationError,
    ProviderBackend, response_object, scalar_uid,
};
use crate::types::AuthDetails;

/// Default claim mapping for OIDC-shaped user info.
#[must_use]
pub fn default_mapping() -> AttributeMapping {
    AttributeMapping::new("sub")
        .with_email("email")
        .with_names("given_name", "family_name")
        .with_full_name("name")
}

/// An OAuth2 backend.
#[derive(Debug, Clone)]
pub struct OAuth2Backend {
    name: String,
    mapping: AttributeMapping,
    email_required: bool,
    access: AccessRule,
}

impl OAuth2Backend {
    /// Creates a backend using the OIDC claim names.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_mapping(name, default_mapping())
    }

    /// Creates a backend with a custom claim mapping.
    #[must_use]
    pub fn with_mapping(name: impl Into<String>, mapping: AttributeMapping) -> Self {
        Self {
            name: name.into(),
            mapping,
            email_required: false,
            access: AccessRule::AllowAll,
        }
    }

    /// Sets the access rule.
    #[must_use]
    pub fn with_access(mut self, access: AccessRule) -> Self {
        self.access = access;
        self
    }

    /// Sets whether email is required.
    #[must_use]
    pub fn with_email_required(mut self, required: bool) -> Self {
        self.email_required = required;
        self
    }
}

impl ProviderBackend for OAuth2Backend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::OAuth2
    }

    fn details(&self, response: &Value) -> Result<AuthDetails, NormalizationError> {
        Ok(self
            .mapping
            .details(response_object(&self.name, response)?))
    }

    fn provider_uid(&self, response: &Value) -> Result<String, NormalizationError> {
        scalar_uid(
            &self.name,
            response_object(&self.name, response)?,
            &self.mapping.uid,
        )
    }

    fn is_email_required(&self) -> bool {
        self.email_required
    }

    fn check_access(&self, details: &AuthDetails) -> AccessDecision {
        self.access.evaluate(details)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_oidc_claims() {
        let backend = OAuth2Backend::new("google");
        let response = json!({
            "sub": "1098",
            "email": "Someone@Example.com",
            "given_name": "Some",
            "family_name": "One",
            "name": "Some One"
        });

        let (uid, details) = backend.normalize(&response).unwrap();
        assert_eq!(uid, "1098");
        assert_eq!(details.email.as_deref(), Some("someone@example.com"));
        assert_eq!(details.display_name().as_deref(), Some("Some One"));
    }

    #[test]
    fn test_numeric_uid_is_stringified() {
        let backend =
            OAuth2Backend::with_mapping("github", AttributeMapping::new("id").with_email("email"));
        let uid = backend.provider_uid(&json!({"id": 583231})).unwrap();
        assert_eq!(uid, "583231");
    }

    #[test]
    fn test_missing_subject() {
        let backend = OAuth2Backend::new("google");
        let err = backend
            .provider_uid(&json!({"email": "a@b.fi"}))
            .unwrap_err();
        assert_eq!(err, NormalizationError::missing_identifier("google", "sub"));
    }

    #[test]
    fn test_email_required_flag() {
        let backend = OAuth2Backend::new("facebook").with_email_required(true);
        assert!(backend.is_email_required());
        assert_eq!(backend.kind(), BackendKind::OAuth2);
    }
}
