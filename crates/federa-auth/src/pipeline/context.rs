//! Per-transaction mutable state shared by the stages.

use std::sync::Arc;

use serde_json::Value;

use super::Stage;
use crate::backend::ProviderBackend;
use crate::identity::Resolution;
use crate::storage::User;
use crate::types::AuthDetails;

/// State of one authentication transaction.
///
/// Owned by a single task for the lifetime of one `authenticate` call and
/// never shared between transactions.
#[derive(Debug)]
pub struct TransactionContext {
    /// The backend driving this transaction.
    pub backend: Arc<dyn ProviderBackend>,

    /// Identifier typed into a credential form, if any.
    pub identifier: Option<String>,

    /// Raw provider response; `Null` until the input has been resolved.
    pub response: Value,

    /// Details accumulated by `social_details`.
    pub details: AuthDetails,

    /// Identity resolution state, restarted on a lost commit race.
    pub resolution: Resolution,

    /// The committed user, set by `finalize`.
    pub user: Option<User>,

    /// Stages that completed, in order.
    pub completed: Vec<Stage>,

    /// Commit attempt, starting at 1.
    pub attempt: u32,
}

impl TransactionContext {
    /// Creates a context for `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn ProviderBackend>) -> Self {
        let resolution = Resolution::new(backend.name(), "");
        Self {
            backend,
            identifier: None,
            response: Value::Null,
            details: AuthDetails::default(),
            resolution,
            user: None,
            completed: Vec::new(),
            attempt: 1,
        }
    }

    /// Name of the backend.
    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Provider uid, once `social_uid` ran.
    #[must_use]
    pub fn provider_uid(&self) -> Option<&str> {
        Some(self.resolution.provider_uid.as_str()).filter(|uid| !uid.is_empty())
    }

    /// Identifier recorded in the audit log: the submitted identifier, else
    /// the provider uid, else empty.
    #[must_use]
    pub fn audit_identifier(&self) -> String {
        self.identifier
            .as_deref()
            .or_else(|| self.provider_uid())
            .unwrap_or_default()
            .to_string()
    }

    /// Returns `true` if `stage` should not run for this transaction.
    #[must_use]
    pub fn skips(&self, stage: Stage) -> bool {
        stage.skipped_for_existing_identity() && self.resolution.is_existing()
    }

    /// Drops the identity plan so resolution can start over after a lost race.
    pub fn restart_resolution(&mut self) {
        let uid = self.resolution.provider_uid.clone();
        self.resolution = Resolution::new(self.backend.name(), uid);
        self.completed
            .retain(|stage| stage.position() < Stage::SocialUser.position());
        self.attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OAuth2Backend;

    fn context() -> TransactionContext {
        TransactionContext::new(Arc::new(OAuth2Backend::new("google")))
    }

    #[test]
    fn test_audit_identifier_prefers_submitted_identifier() {
        let mut ctx = context();
        assert_eq!(ctx.audit_identifier(), "");

        ctx.resolution.provider_uid = "sub-1".to_string();
        assert_eq!(ctx.audit_identifier(), "sub-1");

        ctx.identifier = Some("12345".to_string());
        assert_eq!(ctx.audit_identifier(), "12345");
    }

    #[test]
    fn test_restart_keeps_early_stages() {
        let mut ctx = context();
        ctx.resolution.provider_uid = "sub-1".to_string();
        ctx.completed = Stage::ORDER[..9].to_vec();

        ctx.restart_resolution();

        assert_eq!(
            ctx.completed,
            vec![Stage::SocialDetails, Stage::SocialUid, Stage::AuthAllowed]
        );
        assert_eq!(ctx.provider_uid(), Some("sub-1"));
        assert!(!ctx.resolution.has_user());
        assert_eq!(ctx.attempt, 2);
    }
}
