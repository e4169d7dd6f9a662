//! The authentication pipeline.
//!
//! One call to [`Pipeline::authenticate`] is one transaction: the backend is
//! looked up, credentials are exchanged for a provider response when the
//! backend works that way, and then the fixed [`Stage`] list runs in order
//! over a [`TransactionContext`]. The first failing stage aborts the rest.
//!
//! Identity stages only plan writes. `finalize` applies the whole plan in a
//! single storage commit, so an abort at any point leaves storage untouched.
//!
//! Exactly one [`AuditEntry`] is written per transaction, after the outcome
//! is known.

mod context;
mod stage;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use context::TransactionContext;
pub use stage::Stage;

use crate::audit::{AuditEntry, AuditLog, AuditOutcome};
use crate::backend::{AccessDecision, BackendRegistry, NormalizationError};
use crate::config::ConfigError;
use crate::error::PipelineError;
use crate::identity::{
    IdentityPolicy, IdentityResolver, MAX_COMMIT_ATTEMPTS, ResolveError, Retry,
    refresh_extra_data,
};
use crate::login::{CredentialExchange, CredentialVerifier};
use crate::rate_limit::RateLimiter;
use crate::storage::{IdentityStorage, RateLimitStore, User};
use crate::types::AuthInput;

/// Called once a transaction committed.
#[async_trait]
pub trait AuthCompletion: Send + Sync {
    /// Completes the login for `user` on `backend`.
    async fn complete(&self, user: &User, backend: &str);
}

/// Completion hook that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCompletion;

#[async_trait]
impl AuthCompletion for LoggingCompletion {
    async fn complete(&self, user: &User, backend: &str) {
        tracing::info!(
            user_id = %user.id,
            username = %user.username,
            backend,
            "authentication completed"
        );
    }
}

/// Outcome of a stage that did not complete.
enum StageFailure {
    Abort(PipelineError),
    Commit(Retry),
}

impl From<PipelineError> for StageFailure {
    fn from(err: PipelineError) -> Self {
        Self::Abort(err)
    }
}

impl From<NormalizationError> for StageFailure {
    fn from(err: NormalizationError) -> Self {
        Self::Abort(err.into())
    }
}

impl From<ResolveError> for StageFailure {
    fn from(err: ResolveError) -> Self {
        Self::Abort(err.into())
    }
}

/// Runs authentication transactions.
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<BackendRegistry>,
    resolver: IdentityResolver,
    exchange: CredentialExchange,
    audit: Arc<dyn AuditLog>,
    completion: Option<Arc<dyn AuthCompletion>>,
}

impl Pipeline {
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// The backend registry.
    #[must_use]
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// The credential exchange, for inspecting attempt counters.
    #[must_use]
    pub fn exchange(&self) -> &CredentialExchange {
        &self.exchange
    }

    /// Authenticates `input` against the backend named `backend_name`.
    ///
    /// Stages run strictly one after another. On success the committed user
    /// is handed to the completion hook before it is returned.
    ///
    /// # Errors
    ///
    /// Every failure is converted into a [`PipelineError`]; see its variants.
    pub async fn authenticate(
        &self,
        backend_name: &str,
        input: AuthInput,
    ) -> Result<User, PipelineError> {
        let submitted = match &input {
            AuthInput::Credentials(credentials) => Some(credentials.identifier.clone()),
            AuthInput::Response(_) => None,
        };

        let backend = match self.registry.get(backend_name) {
            Ok(backend) => backend,
            Err(err) => {
                tracing::warn!(backend = backend_name, error = %err, "authentication rejected");
                let entry = AuditEntry::new(
                    backend_name,
                    submitted.unwrap_or_default(),
                    AuditOutcome::Failure,
                );
                self.record(entry.with_reason(err.code())).await;
                return Err(err);
            }
        };

        let mut ctx = TransactionContext::new(backend);
        ctx.identifier = submitted;

        let result = self.run(&mut ctx, input).await;

        let entry = match &result {
            Ok(_) => AuditEntry::new(backend_name, ctx.audit_identifier(), AuditOutcome::Success),
            Err(err) => {
                tracing::debug!(
                    backend = backend_name,
                    category = %err.category(),
                    completed = ctx.completed.len(),
                    error = %err,
                    "transaction aborted"
                );
                AuditEntry::new(backend_name, ctx.audit_identifier(), err.audit_outcome())
                    .with_reason(err.code())
            }
        };
        self.record(entry).await;

        if let Ok(user) = &result
            && let Some(completion) = &self.completion
        {
            completion.complete(user, backend_name).await;
        }
        result
    }

    async fn run(
        &self,
        ctx: &mut TransactionContext,
        input: AuthInput,
    ) -> Result<User, PipelineError> {
        ctx.response = self.provider_response(ctx, input).await?;

        let mut index = 0;
        while let Some(&stage) = Stage::ORDER.get(index) {
            if ctx.skips(stage) {
                tracing::trace!(stage = %stage, "skipped for existing identity");
                index += 1;
                continue;
            }

            tracing::debug!(backend = ctx.backend_name(), stage = %stage, "running stage");
            match self.run_stage(stage, ctx).await {
                Ok(()) => {
                    ctx.completed.push(stage);
                    index += 1;
                }
                Err(StageFailure::Abort(err)) => return Err(err),
                Err(StageFailure::Commit(Retry::Conflict(err)))
                    if ctx.attempt < MAX_COMMIT_ATTEMPTS =>
                {
                    tracing::debug!(
                        backend = ctx.backend_name(),
                        attempt = ctx.attempt,
                        error = %err,
                        "commit lost a race, resolving again"
                    );
                    ctx.restart_resolution();
                    index = Stage::SocialUser.position();
                }
                Err(StageFailure::Commit(retry)) => {
                    let uid = ctx.resolution.provider_uid.clone();
                    return Err(retry.into_error(ctx.backend_name(), &uid).into());
                }
            }
        }

        ctx.user
            .take()
            .ok_or_else(|| PipelineError::Storage("pipeline finished without a user".to_string()))
    }

    /// Turns the input into the provider response the stages consume.
    async fn provider_response(
        &self,
        ctx: &TransactionContext,
        input: AuthInput,
    ) -> Result<Value, PipelineError> {
        let backend = &ctx.backend;
        match (input, backend.as_credential()) {
            (AuthInput::Credentials(credentials), Some(_)) if !credentials.is_complete() => {
                Err(PipelineError::IncompleteCredentials {
                    backend: backend.name().to_string(),
                })
            }
            (AuthInput::Credentials(credentials), Some(credential_backend)) => Ok(self
                .exchange
                .exchange(credential_backend, &credentials)
                .await?),
            (AuthInput::Response(response), None) => Ok(response),
            (input, _) => Err(PipelineError::UnsupportedInput {
                backend: backend.name().to_string(),
                input: input.kind(),
            }),
        }
    }

    async fn run_stage(
        &self,
        stage: Stage,
        ctx: &mut TransactionContext,
    ) -> Result<(), StageFailure> {
        let backend = Arc::clone(&ctx.backend);
        match stage {
            Stage::SocialDetails => {
                ctx.details = backend.details(&ctx.response)?;
            }
            Stage::SocialUid => {
                ctx.resolution.provider_uid = backend.provider_uid(&ctx.response)?;
            }
            Stage::AuthAllowed => {
                if let AccessDecision::Deny { reason } = backend.check_access(&ctx.details) {
                    tracing::warn!(backend = backend.name(), reason, "access denied");
                    return Err(PipelineError::not_allowed(backend.name()).into());
                }
            }
            Stage::SocialUser => {
                self.resolver.social_user(&mut ctx.resolution).await?;
            }
            Stage::RequireEmail => {
                self.resolver
                    .require_email(&ctx.details, backend.is_email_required())?;
            }
            Stage::AssociateByEmail => {
                self.resolver
                    .associate_by_email(&mut ctx.resolution, &ctx.details)
                    .await?;
            }
            Stage::CreateUser => {
                self.resolver.create_user(&mut ctx.resolution, &ctx.details);
            }
            Stage::CheckExistingSocialAssociations => {
                self.resolver
                    .check_existing_social_associations(&ctx.resolution)?;
            }
            Stage::AssociateUser => {
                self.resolver.associate_user(&mut ctx.resolution);
            }
            Stage::LoadExtraData => {
                if let Some(identity) = ctx.resolution.identity.as_mut() {
                    refresh_extra_data(identity, &ctx.details);
                }
            }
            Stage::UserDetails => {
                if let Some(user) = ctx.resolution.user.as_mut() {
                    user.merge_details(&ctx.details);
                }
            }
            Stage::UpdateGroups => {
                if let Some(user) = ctx.resolution.user.as_mut()
                    && !ctx.details.groups.is_empty()
                    && user.groups != ctx.details.groups
                {
                    tracing::debug!(user_id = %user.id, groups = ctx.details.groups.len(), "updating groups");
                    user.groups = ctx.details.groups.clone();
                }
            }
            Stage::Finalize => {
                if let Some(user) = ctx.resolution.user.as_mut() {
                    user.last_login_backend = Some(backend.name().to_string());
                }
                let (user, _) = self
                    .resolver
                    .commit(ctx.resolution.clone())
                    .await
                    .map_err(StageFailure::Commit)?;
                ctx.user = Some(user);
            }
        }
        Ok(())
    }

    async fn record(&self, entry: AuditEntry) {
        let backend = entry.backend.clone();
        if let Err(e) = self.audit.record(entry).await {
            tracing::error!(backend, error = %e, "failed to write audit entry");
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("backends", &self.registry.len())
            .field("resolver", &self.resolver)
            .field("exchange", &self.exchange)
            .field("completion", &self.completion.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    registry: Option<BackendRegistry>,
    identity_storage: Option<Arc<dyn IdentityStorage>>,
    rate_limit_store: Option<Arc<dyn RateLimitStore>>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
    audit: Option<Arc<dyn AuditLog>>,
    completion: Option<Arc<dyn AuthCompletion>>,
    policy: IdentityPolicy,
}

impl PipelineBuilder {
    /// Sets the backend registry.
    #[must_use]
    pub fn registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets user and identity storage.
    #[must_use]
    pub fn identity_storage(mut self, storage: Arc<dyn IdentityStorage>) -> Self {
        self.identity_storage = Some(storage);
        self
    }

    /// Sets the attempt counter store.
    #[must_use]
    pub fn rate_limit_store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.rate_limit_store = Some(store);
        self
    }

    /// Sets the remote credential verifier.
    #[must_use]
    pub fn verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Sets the audit log.
    #[must_use]
    pub fn audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Sets the completion hook.
    #[must_use]
    pub fn completion(mut self, completion: Arc<dyn AuthCompletion>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Sets the account linking policy.
    #[must_use]
    pub fn identity_policy(mut self, policy: IdentityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when a required collaborator was not
    /// set.
    pub fn build(self) -> Result<Pipeline, ConfigError> {
        let registry = self.registry.ok_or_else(|| missing("registry"))?;
        let storage = self
            .identity_storage
            .ok_or_else(|| missing("identity_storage"))?;
        let store = self
            .rate_limit_store
            .ok_or_else(|| missing("rate_limit_store"))?;
        let verifier = self.verifier.ok_or_else(|| missing("verifier"))?;
        let audit = self.audit.ok_or_else(|| missing("audit_log"))?;

        Ok(Pipeline {
            registry: Arc::new(registry),
            resolver: IdentityResolver::new(storage, self.policy),
            exchange: CredentialExchange::new(RateLimiter::new(store), verifier),
            audit,
            completion: self.completion,
        })
    }
}

fn missing(what: &str) -> ConfigError {
    ConfigError::Missing(format!("pipeline {what}"))
}
