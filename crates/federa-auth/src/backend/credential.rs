//! Credential-exchange backends.
//!
//! The user types an identifier and a secret into a local form; the broker
//! posts them to the backend's verification API and normalizes the JSON the
//! API answers with.
//!
//! Canonical identity keys:
//!
//! | Backend | Provider uid     |
//! |---------|------------------|
//! | `koha`  | `borrowernumber` |
//! | `foli`  | `turkuid`        |
//!
//! The card number or username typed into the form is never used as the uid;
//! it only keys the rate limiter and the audit log.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::{
    AccessDecision, AccessRule, AttributeMapping, BackendKind, NormalizationError,
    ProviderBackend, response_object, scalar_uid,
};
use crate::login::{FieldSpec, FormSpec};
use crate::rate_limit::RateLimitPolicy;
use crate::types::AuthDetails;

/// How identifier and secret are encoded in the verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestEncoding {
    /// `multipart/form-data` text parts.
    Multipart,
    /// A JSON object.
    Json,
}

/// Wire contract of a verification API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialProtocol {
    /// Path appended to the API base URL.
    pub path: String,

    /// Request body encoding.
    pub encoding: RequestEncoding,

    /// Request parameter carrying the identifier.
    pub identifier_param: String,

    /// Request parameter carrying the secret.
    pub secret_param: String,

    /// Non-2xx statuses whose JSON body may report rejected credentials.
    #[serde(default)]
    pub rejection_statuses: Vec<u16>,

    /// Response field signalling rejected credentials.
    pub rejection_field: String,

    /// Value of `rejection_field` meaning "bad credentials".
    pub rejection_value: String,
}

impl CredentialProtocol {
    /// Koha borrower status API.
    #[must_use]
    pub fn koha() -> Self {
        Self {
            path: "/contrib/kohasuomi/borrowers/status".to_string(),
            encoding: RequestEncoding::Multipart,
            identifier_param: "uname".to_string(),
            secret_param: "passwd".to_string(),
            rejection_statuses: vec![400],
            rejection_field: "error".to_string(),
            rejection_value: "Authentication failed for the given username and password."
                .to_string(),
        }
    }

    /// Föli account API.
    #[must_use]
    pub fn foli() -> Self {
        Self {
            path: "/auth".to_string(),
            encoding: RequestEncoding::Json,
            identifier_param: "username".to_string(),
            secret_param: "password".to_string(),
            rejection_statuses: vec![401],
            rejection_field: "result".to_string(),
            rejection_value: "unknown user or password".to_string(),
        }
    }

    /// Returns `true` if a response with `status` should have its body read.
    #[must_use]
    pub fn reads_body(&self, status: u16) -> bool {
        (200..300).contains(&status) || self.rejection_statuses.contains(&status)
    }

    /// Returns `true` if `body` reports rejected credentials.
    #[must_use]
    pub fn is_rejection(&self, body: &Value) -> bool {
        body.get(&self.rejection_field).and_then(Value::as_str)
            == Some(self.rejection_value.as_str())
    }
}

/// A credential-exchange backend.
#[derive(Debug, Clone)]
pub struct CredentialBackend {
    name: String,
    api_url: Url,
    protocol: CredentialProtocol,
    form: FormSpec,
    mapping: AttributeMapping,
    rate_limit: RateLimitPolicy,
    email_required: bool,
    access: AccessRule,
}

impl CredentialBackend {
    /// Creates a backend.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        api_url: Url,
        protocol: CredentialProtocol,
        form: FormSpec,
        mapping: AttributeMapping,
    ) -> Self {
        Self {
            name: name.into(),
            api_url,
            protocol,
            form,
            mapping,
            rate_limit: RateLimitPolicy::default(),
            email_required: false,
            access: AccessRule::AllowAll,
        }
    }

    /// Koha library card login.
    #[must_use]
    pub fn koha(name: impl Into<String>, api_url: Url) -> Self {
        Self::new(
            name,
            api_url,
            CredentialProtocol::koha(),
            FormSpec {
                title: "Library card".to_string(),
                identifier: FieldSpec::new("borrower_card_id", "Library card identifier")
                    .with_max_length(32),
                secret: FieldSpec::new("borrower_pin", "Card PIN").with_max_length(4),
            },
            AttributeMapping::new("borrowernumber")
                .with_email("email")
                .with_names("firstname", "surname"),
        )
    }

    /// Föli travel card account login.
    #[must_use]
    pub fn foli(name: impl Into<String>, api_url: Url) -> Self {
        Self::new(
            name,
            api_url,
            CredentialProtocol::foli(),
            FormSpec {
                title: "Föli account".to_string(),
                identifier: FieldSpec::new("username", "Username").with_max_length(32),
                secret: FieldSpec::new("password", "Password"),
            },
            AttributeMapping::new("turkuid")
                .with_email("email")
                .with_names("firstname", "lastname"),
        )
    }

    /// Sets the rate limit policy.
    #[must_use]
    pub fn with_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = policy;
        self
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

    /// The wire contract.
    #[must_use]
    pub fn protocol(&self) -> &CredentialProtocol {
        &self.protocol
    }

    /// The login form.
    #[must_use]
    pub fn form(&self) -> &FormSpec {
        &self.form
    }

    /// The rate limit policy.
    #[must_use]
    pub fn rate_limit(&self) -> &RateLimitPolicy {
        &self.rate_limit
    }

    /// Full URL of the verification endpoint.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.api_url.as_str().trim_end_matches('/'),
            self.protocol.path
        )
    }
}

impl ProviderBackend for CredentialBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Credential
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

    fn as_credential(&self) -> Option<&CredentialBackend> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn koha() -> CredentialBackend {
        CredentialBackend::koha("koha", Url::parse("https://koha.example.fi/api/").unwrap())
    }

    #[test]
    fn test_endpoint_joins_base_and_path() {
        assert_eq!(
            koha().endpoint(),
            "https://koha.example.fi/api/contrib/kohasuomi/borrowers/status"
        );
    }

    #[test]
    fn test_koha_borrower_normalization() {
        let response = json!({
            "borrowernumber": 4711,
            "email": "  A@B.fi ",
            "firstname": " Aino",
            "surname": "Virtanen "
        });

        let (uid, details) = koha().normalize(&response).unwrap();
        assert_eq!(uid, "4711");
        assert_eq!(details.email.as_deref(), Some("a@b.fi"));
        assert_eq!(details.first_name, "Aino");
        assert_eq!(details.last_name, "Virtanen");
    }

    #[test]
    fn test_blank_email_becomes_absent() {
        let details = koha()
            .details(&json!({"borrowernumber": "1", "email": "  "}))
            .unwrap();
        assert_eq!(details.email, None);
    }

    #[test]
    fn test_foli_uid_is_turkuid() {
        let backend = CredentialBackend::foli("foli", Url::parse("https://foli.example.fi").unwrap());
        let response = json!({"turkuid": "T-99", "username": "matti", "lastname": "M"});
        assert_eq!(backend.provider_uid(&response).unwrap(), "T-99");

        let err = backend
            .provider_uid(&json!({"username": "matti"}))
            .unwrap_err();
        assert_eq!(err, NormalizationError::missing_identifier("foli", "turkuid"));
    }

    #[test]
    fn test_rejection_sentinel() {
        let koha = CredentialProtocol::koha();
        assert!(koha.is_rejection(&json!({
            "error": "Authentication failed for the given username and password."
        })));
        assert!(!koha.is_rejection(&json!({"error": "Something else"})));
        assert!(!koha.is_rejection(&json!({"borrowernumber": 1})));

        let foli = CredentialProtocol::foli();
        assert!(foli.is_rejection(&json!({"result": "unknown user or password"})));
    }

    #[test]
    fn test_body_statuses() {
        let koha = CredentialProtocol::koha();
        assert!(koha.reads_body(200));
        assert!(koha.reads_body(400));
        assert!(!koha.reads_body(401));
        assert!(!koha.reads_body(500));

        let foli = CredentialProtocol::foli();
        assert!(foli.reads_body(401));
        assert!(!foli.reads_body(400));
    }

    #[test]
    fn test_form_limits() {
        let form = koha().form().clone();
        assert_eq!(form.identifier.name, "borrower_card_id");
        assert_eq!(form.identifier.max_length, Some(32));
        assert_eq!(form.secret.max_length, Some(4));
    }
}
