//! Outbound calls to credential verification APIs.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::CredentialError;
use crate::backend::{CredentialBackend, ProviderBackend, RequestEncoding};
use crate::types::Credentials;

/// Verifies credentials against a backend's remote API.
///
/// Returns the API's JSON body when the credentials are accepted.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Calls the remote API once.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::InvalidCredentials`] when the API reports bad
    ///   credentials through the backend's sentinel
    /// - [`CredentialError::Unavailable`] for transport failures, timeouts,
    ///   unexpected statuses and malformed bodies
    async fn verify(
        &self,
        backend: &CredentialBackend,
        credentials: &Credentials,
    ) -> Result<Value, CredentialError>;
}

/// [`CredentialVerifier`] over `reqwest` with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpCredentialVerifier {
    http_client: reqwest::Client,
}

impl HttpCredentialVerifier {
    /// Creates a verifier whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl CredentialVerifier for HttpCredentialVerifier {
    async fn verify(
        &self,
        backend: &CredentialBackend,
        credentials: &Credentials,
    ) -> Result<Value, CredentialError> {
        let name = backend.name();
        let protocol = backend.protocol();
        let endpoint = backend.endpoint();

        let request = self
            .http_client
            .post(&endpoint)
            .header(reqwest::header::ACCEPT, "application/json");
        let request = match protocol.encoding {
            RequestEncoding::Multipart => request.multipart(
                reqwest::multipart::Form::new()
                    .text(protocol.identifier_param.clone(), credentials.identifier.clone())
                    .text(protocol.secret_param.clone(), credentials.secret.clone()),
            ),
            RequestEncoding::Json => {
                let mut body = serde_json::Map::new();
                body.insert(
                    protocol.identifier_param.clone(),
                    Value::String(credentials.identifier.clone()),
                );
                body.insert(
                    protocol.secret_param.clone(),
                    Value::String(credentials.secret.clone()),
                );
                request.json(&Value::Object(body))
            }
        };

        let response = request.send().await.map_err(|e| {
            tracing::error!(backend = name, error = %e, "credential API call failed");
            CredentialError::unavailable(name, e.to_string())
        })?;

        let status = response.status().as_u16();
        if !protocol.reads_body(status) {
            tracing::error!(backend = name, status, "credential API returned unexpected status");
            return Err(CredentialError::unavailable(
                name,
                format!("unexpected status {status}"),
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            tracing::error!(backend = name, error = %e, "credential API returned invalid JSON");
            CredentialError::unavailable(name, format!("invalid JSON: {e}"))
        })?;

        if protocol.is_rejection(&body) {
            return Err(CredentialError::InvalidCredentials);
        }
        if !(200..300).contains(&status) {
            tracing::error!(backend = name, status, "credential API error without rejection");
            return Err(CredentialError::unavailable(
                name,
                format!("status {status} without a rejection"),
            ));
        }
        if !body.is_object() {
            return Err(CredentialError::unavailable(
                name,
                "response is not a JSON object",
            ));
        }

        Ok(body)
    }
}
