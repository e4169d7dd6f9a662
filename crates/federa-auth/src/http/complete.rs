//! Provider response endpoint.
//!
//! ```text
//! POST /auth/{backend}/complete
//! Content-Type: application/json
//!
//! {"attributes": {"http://schemas.microsoft.com/ws/2013/11/alternateloginid": ["jdoe"]}}
//! ```

use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde_json::Value;

use super::{AuthState, AuthSummary, authenticate_detached};
use crate::types::AuthInput;

/// Runs the pipeline on a federation or OAuth2 provider response.
pub async fn complete_handler(
    State(state): State<AuthState>,
    Path(backend): Path<String>,
    Json(response): Json<Value>,
) -> Response {
    match authenticate_detached(&state.pipeline, &backend, AuthInput::Response(response)).await {
        Ok(user) => Json(AuthSummary::new(&user, &backend)).into_response(),
        Err(err) => err.into_response(),
    }
}
