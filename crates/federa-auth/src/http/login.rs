//! Login start and credential form endpoints.

use std::collections::HashMap;

use axum::{
    Form, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};

use super::templates::{render_credential_form, render_error_page};
use super::{AuthState, AuthSummary, authenticate_detached};
use crate::backend::BackendKind;
use crate::error::PipelineError;
use crate::login::{FormErrors, FormSpec, LoginState};
use crate::types::AuthInput;

/// `GET /auth/{backend}/login`.
///
/// Credential backends get their form; federation backends are redirected
/// to the IdP's single sign-on URL.
pub async fn login_form_handler(
    State(state): State<AuthState>,
    Path(backend_name): Path<String>,
) -> Response {
    let backend = match state.pipeline.registry().get(&backend_name) {
        Ok(backend) => backend,
        Err(err) => return error_page(&err),
    };

    match backend.kind() {
        BackendKind::Credential => match backend.as_credential() {
            Some(credential) => {
                tracing::debug!(
                    backend = %backend_name,
                    from = %LoginState::Idle,
                    to = %LoginState::FormDisplayed,
                    "login state"
                );
                Html(render_credential_form(
                    credential.form(),
                    None,
                    &FormErrors::default(),
                ))
                .into_response()
            }
            None => error_page(&unsupported(&backend_name)),
        },
        BackendKind::Federation => {
            match state
                .metadata
                .for_backend(state.pipeline.registry(), &backend_name)
                .await
            {
                Ok(metadata) => Redirect::to(metadata.sso_url.as_str()).into_response(),
                Err(e) => {
                    tracing::error!(backend = %backend_name, error = %e, "cannot start federated login");
                    error_page(&PipelineError::backend_unavailable(&backend_name))
                }
            }
        }
        BackendKind::OAuth2 => error_page(&unsupported(&backend_name)),
    }
}

/// `POST /auth/{backend}/login`.
///
/// Invalid forms are re-rendered with field errors and never reach the
/// pipeline. Rejected credentials re-render the form with a generic message.
pub async fn login_submit_handler(
    State(state): State<AuthState>,
    Path(backend_name): Path<String>,
    Form(data): Form<HashMap<String, String>>,
) -> Response {
    let backend = match state.pipeline.registry().get(&backend_name) {
        Ok(backend) => backend,
        Err(err) => return error_page(&err),
    };
    let Some(credential) = backend.as_credential() else {
        return error_page(&unsupported(&backend_name));
    };
    let form = credential.form();

    let credentials = match form.validate(&data) {
        Ok(credentials) => credentials,
        Err(errors) => {
            let identifier = data.get(&form.identifier.name).map(|v| v.trim());
            return form_page(StatusCode::BAD_REQUEST, form, identifier, &errors);
        }
    };

    let identifier = credentials.identifier.clone();
    let input = AuthInput::Credentials(credentials);
    match authenticate_detached(&state.pipeline, &backend_name, input).await {
        Ok(user) => Json(AuthSummary::new(&user, &backend_name)).into_response(),
        Err(
            err @ (PipelineError::AuthenticationFailed
            | PipelineError::IncompleteCredentials { .. }
            | PipelineError::AccountTemporarilyLocked
            | PipelineError::BackendUnavailable { .. }),
        ) => form_page(
            status_of(&err),
            form,
            Some(&identifier),
            &FormErrors::general(err.user_message()),
        ),
        Err(err) => error_page(&err),
    }
}

fn unsupported(backend: &str) -> PipelineError {
    PipelineError::UnsupportedInput {
        backend: backend.to_string(),
        input: "login form",
    }
}

fn status_of(err: &PipelineError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn form_page(
    status: StatusCode,
    form: &FormSpec,
    identifier: Option<&str>,
    errors: &FormErrors,
) -> Response {
    (
        status,
        Html(render_credential_form(form, identifier, errors)),
    )
        .into_response()
}

fn error_page(err: &PipelineError) -> Response {
    (
        status_of(err),
        Html(render_error_page(err.code(), err.user_message())),
    )
        .into_response()
}
