//! Rate-checked credential exchange.

use std::sync::Arc;

use serde_json::Value;

use super::{CredentialError, CredentialVerifier, LoginState};
use crate::backend::{CredentialBackend, ProviderBackend};
use crate::rate_limit::RateLimiter;
use crate::types::Credentials;

/// Drives one submitted form from `Submitted` to a terminal state.
///
/// Auditing is left to the caller, which owns the transaction outcome.
#[derive(Clone)]
pub struct CredentialExchange {
    limiter: RateLimiter,
    verifier: Arc<dyn CredentialVerifier>,
}

impl CredentialExchange {
    /// Creates an exchange.
    #[must_use]
    pub fn new(limiter: RateLimiter, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { limiter, verifier }
    }

    /// The limiter used for attempt counting.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Runs rate check and remote call, returning the accepted API body.
    ///
    /// The counter is incremented before the remote call, kept on rejected
    /// credentials and reset once the API accepts them.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::Locked`] when the counter is past the threshold;
    ///   the API is not called
    /// - [`CredentialError::InvalidCredentials`] when the API rejects them
    /// - [`CredentialError::Unavailable`] for remote or counter store failures
    pub async fn exchange(
        &self,
        backend: &CredentialBackend,
        credentials: &Credentials,
    ) -> Result<Value, CredentialError> {
        let name = backend.name();
        let identifier = credentials.identifier.as_str();
        let mut state = LoginState::Submitted;

        state = transition(name, state, LoginState::RateCheck);
        let counter = self
            .limiter
            .hit(name, identifier, backend.rate_limit())
            .await
            .map_err(|e| CredentialError::unavailable(name, e.to_string()))?;
        if counter.should_block() {
            transition(name, state, LoginState::Locked);
            tracing::warn!(
                backend = name,
                attempts = counter.count,
                retry_after_secs = counter.retry_after().as_secs(),
                "login attempts exceeded, account temporarily locked"
            );
            return Err(CredentialError::Locked);
        }

        state = transition(name, state, LoginState::RemoteCall);
        let body = match self.verifier.verify(backend, credentials).await {
            Ok(body) => body,
            Err(err) => {
                transition(name, state, LoginState::from(&err));
                if matches!(err, CredentialError::InvalidCredentials) {
                    tracing::warn!(backend = name, "remote system rejected credentials");
                }
                return Err(err);
            }
        };

        transition(name, state, LoginState::Authenticated);
        if let Err(e) = self.limiter.reset(name, identifier).await {
            tracing::error!(backend = name, error = %e, "failed to reset rate limit counter");
        }
        Ok(body)
    }
}

fn transition(backend: &str, from: LoginState, to: LoginState) -> LoginState {
    debug_assert!(from.can_transition_to(to), "{from} -> {to}");
    tracing::debug!(backend, from = %from, to = %to, "login state");
    to
}

impl std::fmt::Debug for CredentialExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialExchange")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}
