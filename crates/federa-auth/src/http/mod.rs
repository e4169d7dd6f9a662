//! Axum handlers for the login endpoints.
//!
//! # Routes
//!
//! - `GET  /auth/{backend}/login` - credential form, or redirect to the IdP
//! - `POST /auth/{backend}/login` - submit a credential form
//! - `POST /auth/{backend}/complete` - hand in a provider response
//! - `GET  /health` - liveness
//!
//! Every authentication runs on its own spawned task. A client that goes
//! away does not cancel it; the result is simply dropped.

pub mod complete;
mod error;
pub mod login;
pub mod templates;

use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};

pub use complete::complete_handler;
pub use login::{login_form_handler, login_submit_handler};

use crate::error::PipelineError;
use crate::metadata::IdpMetadataCache;
use crate::pipeline::Pipeline;
use crate::storage::User;
use crate::types::AuthInput;

/// Shared state of the login endpoints.
#[derive(Clone, Debug)]
pub struct AuthState {
    /// The authentication pipeline.
    pub pipeline: Arc<Pipeline>,
    /// IdP metadata for federation redirects.
    pub metadata: Arc<IdpMetadataCache>,
}

impl AuthState {
    /// Creates a new state.
    pub fn new(pipeline: Arc<Pipeline>, metadata: Arc<IdpMetadataCache>) -> Self {
        Self { pipeline, metadata }
    }
}

/// Body returned after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSummary {
    /// Local user id.
    pub user_id: String,
    /// Generated username.
    pub username: String,
    /// Email, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Backend used for this login.
    pub backend: String,
}

impl AuthSummary {
    /// Summarizes `user` after a login on `backend`.
    #[must_use]
    pub fn new(user: &User, backend: &str) -> Self {
        Self {
            user_id: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            backend: backend.to_string(),
        }
    }
}

/// Builds the router for the login endpoints.
pub fn router(state: AuthState) -> Router {
    Router::new()
        .route(
            "/auth/{backend}/login",
            get(login_form_handler).post(login_submit_handler),
        )
        .route("/auth/{backend}/complete", post(complete_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Runs the pipeline on a detached task and waits for it.
pub(crate) async fn authenticate_detached(
    pipeline: &Arc<Pipeline>,
    backend: &str,
    input: AuthInput,
) -> Result<User, PipelineError> {
    let pipeline = Arc::clone(pipeline);
    let name = backend.to_string();
    let task = tokio::spawn(async move { pipeline.authenticate(&name, input).await });
    match task.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(backend, error = %e, "authentication task failed");
            Err(PipelineError::Storage("authentication task failed".to_string()))
        }
    }
}
