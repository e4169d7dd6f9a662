//! Shared fixtures for the pipeline integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use federa_auth::backend::{
    AccessRule, BackendRegistry, CredentialBackend, FederationBackend, OAuth2Backend,
    turku_attributes,
};
use federa_auth::login::HttpCredentialVerifier;
use federa_auth::pipeline::{AuthCompletion, Pipeline};
use federa_auth::rate_limit::RateLimiter;
use federa_auth::storage::User;
use federa_auth::types::{AuthInput, Credentials};
use federa_auth_memory::{InMemoryAuditLog, InMemoryIdentityStorage, InMemoryRateLimitStore};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use url::Url;
use wiremock::MockServer;

pub const KOHA_PATH: &str = "/contrib/kohasuomi/borrowers/status";
pub const KOHA_REJECTION: &str = "Authentication failed for the given username and password.";

/// Completion hook that remembers who logged in.
#[derive(Debug, Default)]
pub struct RecordingCompletion {
    pub completed: Mutex<Vec<(String, String)>>,
}

#[async_trait::async_trait]
impl AuthCompletion for RecordingCompletion {
    async fn complete(&self, user: &User, backend: &str) {
        self.completed
            .lock()
            .await
            .push((user.id.to_string(), backend.to_string()));
    }
}

pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub storage: Arc<InMemoryIdentityStorage>,
    pub rates: Arc<InMemoryRateLimitStore>,
    pub audit: Arc<InMemoryAuditLog>,
    pub completion: Arc<RecordingCompletion>,
    pub server: MockServer,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_storage(InMemoryIdentityStorage::new()).await
    }

    pub async fn with_storage(storage: InMemoryIdentityStorage) -> Self {
        let server = MockServer::start().await;
        let api_url = Url::parse(&server.uri()).unwrap();

        let mut registry = BackendRegistry::new()
            .with(CredentialBackend::koha("koha", api_url.clone()))
            .unwrap()
            .with(CredentialBackend::foli("foli", api_url))
            .unwrap()
            .with(FederationBackend::turku_adfs("turku_adfs"))
            .unwrap()
            .with(FederationBackend::opas_adfs("opas_adfs"))
            .unwrap()
            .with(FederationBackend::opas_student_adfs("opas_student_adfs"))
            .unwrap()
            .with(OAuth2Backend::new("google").with_access(AccessRule::AllowAll))
            .unwrap();
        registry
            .insert(Arc::new(OAuth2Backend::new("retired")), false)
            .unwrap();

        let storage = Arc::new(storage);
        let rates = Arc::new(InMemoryRateLimitStore::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let completion = Arc::new(RecordingCompletion::default());
        let verifier = HttpCredentialVerifier::new(Duration::from_secs(2)).unwrap();

        let pipeline = Pipeline::builder()
            .registry(registry)
            .identity_storage(storage.clone())
            .rate_limit_store(rates.clone())
            .verifier(Arc::new(verifier))
            .audit_log(audit.clone())
            .completion(completion.clone())
            .build()
            .unwrap();

        Self {
            pipeline: Arc::new(pipeline),
            storage,
            rates,
            audit,
            completion,
            server,
        }
    }

    pub async fn login(
        &self,
        backend: &str,
        identifier: &str,
        secret: &str,
    ) -> federa_auth::AuthResult<User> {
        self.pipeline
            .authenticate(backend, AuthInput::from(Credentials::new(identifier, secret)))
            .await
    }

    pub async fn callback(&self, backend: &str, response: Value) -> federa_auth::AuthResult<User> {
        self.pipeline
            .authenticate(backend, AuthInput::Response(response))
            .await
    }

    pub async fn attempts(&self, backend: &str, identifier: &str) -> u32 {
        use federa_auth::storage::RateLimitStore;
        self.rates
            .count(&RateLimiter::key(backend, identifier))
            .await
            .unwrap()
    }
}

pub fn koha_borrower(number: u64, email: &str) -> Value {
    json!({
        "borrowernumber": number,
        "cardnumber": "12345",
        "email": email,
        "firstname": "Aino",
        "surname": "Virtanen",
    })
}

pub fn koha_rejection() -> Value {
    json!({ "error": KOHA_REJECTION })
}

/// ADFS assertion attributes as delivered by the callback.
pub fn adfs_assertion(uid: &str, email: Option<&str>, role: Option<&str>) -> Value {
    let mut attributes = serde_json::Map::new();
    attributes.insert(turku_attributes::UID.to_string(), json!([uid]));
    attributes.insert(turku_attributes::GIVEN_NAME.to_string(), json!(["Eero"]));
    attributes.insert(turku_attributes::SURNAME.to_string(), json!(["Koskinen"]));
    if let Some(email) = email {
        attributes.insert(turku_attributes::EMAIL.to_string(), json!([email]));
    }
    if let Some(role) = role {
        attributes.insert(turku_attributes::ROLE.to_string(), json!([role]));
    }
    json!({ "attributes": attributes })
}
