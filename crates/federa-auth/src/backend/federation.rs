//! Federation (SAML-style) backends.
//!
//! The protocol library validates the assertion; this backend only sees its
//! attribute statement as JSON, either wrapped as `{"attributes": {...}}` or
//! as the bare attribute map. Attribute values may be scalars or lists, and a
//! list contributes its first element.

use serde_json::Value;
use url::Url;

use super::{
    AccessDecision, AccessRule, AttributeMapping, BackendKind, NormalizationError,
    ProviderBackend, response_object,
};
use crate::types::AuthDetails;

/// Attribute URIs released by the Turku ADFS tenants.
pub mod turku_attributes {
    /// Permanent login id, used as the provider uid.
    pub const UID: &str = "http://schemas.microsoft.com/ws/2013/11/alternateloginid";
    /// Email address.
    pub const EMAIL: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress";
    /// Common (full) name.
    pub const COMMON_NAME: &str = "http://schemas.xmlsoap.org/claims/CommonName";
    /// Given name.
    pub const GIVEN_NAME: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/givenname";
    /// Surname.
    pub const SURNAME: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/surname";
    /// Role claim, mapped to `school_role` for the education tenant.
    pub const ROLE: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";
    /// Group memberships.
    pub const GROUPS: &str = "http://schemas.xmlsoap.org/claims/Group";
}

/// A federation backend.
#[derive(Debug, Clone)]
pub struct FederationBackend {
    name: String,
    mapping: AttributeMapping,
    email_required: bool,
    access: AccessRule,
    metadata_url: Option<Url>,
}

impl FederationBackend {
    /// Creates a backend with the given attribute mapping.
    #[must_use]
    pub fn new(name: impl Into<String>, mapping: AttributeMapping) -> Self {
        Self {
            name: name.into(),
            mapping,
            email_required: false,
            access: AccessRule::AllowAll,
            metadata_url: None,
        }
    }

    /// City of Turku ADFS.
    #[must_use]
    pub fn turku_adfs(name: impl Into<String>) -> Self {
        Self::new(name, turku_mapping())
    }

    /// Education department ADFS; also releases the school role.
    #[must_use]
    pub fn opas_adfs(name: impl Into<String>) -> Self {
        Self::new(
            name,
            turku_mapping()
                .with_claim("school_role", turku_attributes::ROLE)
                .with_groups(turku_attributes::GROUPS),
        )
    }

    /// Education department ADFS restricted to students.
    #[must_use]
    pub fn opas_student_adfs(name: impl Into<String>) -> Self {
        Self::opas_adfs(name).with_access(AccessRule::require_claim("school_role", "student"))
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

    /// Sets the IdP metadata location.
    #[must_use]
    pub fn with_metadata_url(mut self, url: Url) -> Self {
        self.metadata_url = Some(url);
        self
    }

    /// Where the IdP metadata is published, if configured.
    #[must_use]
    pub fn metadata_url(&self) -> Option<&Url> {
        self.metadata_url.as_ref()
    }

    /// The attribute mapping.
    #[must_use]
    pub fn mapping(&self) -> &AttributeMapping {
        &self.mapping
    }

    /// The access rule.
    #[must_use]
    pub fn access(&self) -> &AccessRule {
        &self.access
    }

    fn attributes<'a>(
        &self,
        response: &'a Value,
    ) -> Result<&'a serde_json::Map<String, Value>, NormalizationError> {
        let object = response_object(&self.name, response)?;
        match object.get("attributes") {
            Some(Value::Object(attrs)) => Ok(attrs),
            Some(_) => Err(NormalizationError::invalid_response(
                &self.name,
                "attributes is not an object",
            )),
            None => Ok(object),
        }
    }
}

fn turku_mapping() -> AttributeMapping {
    AttributeMapping::new(turku_attributes::UID)
        .with_email(turku_attributes::EMAIL)
        .with_names(turku_attributes::GIVEN_NAME, turku_attributes::SURNAME)
        .with_full_name(turku_attributes::COMMON_NAME)
}

impl ProviderBackend for FederationBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Federation
    }

    fn details(&self, response: &Value) -> Result<AuthDetails, NormalizationError> {
        Ok(self.mapping.details(self.attributes(response)?))
    }

    fn provider_uid(&self, response: &Value) -> Result<String, NormalizationError> {
        let attrs = self.attributes(response)?;
        let value = match attrs.get(&self.mapping.uid) {
            Some(Value::Array(items)) => items.first(),
            other => other,
        };
        match value {
            Some(Value::String(uid)) if !uid.trim().is_empty() => Ok(uid.trim().to_string()),
            _ => {
                tracing::warn!(backend = %self.name, "assertion has no usable uid attribute");
                Err(NormalizationError::missing_identifier(
                    &self.name,
                    &self.mapping.uid,
                ))
            }
        }
    }

    fn is_email_required(&self) -> bool {
        self.email_required
    }

    fn check_access(&self, details: &AuthDetails) -> AccessDecision {
        self.access.evaluate(details)
    }

    fn as_federation(&self) -> Option<&FederationBackend> {
        Some(self)
    }
}
