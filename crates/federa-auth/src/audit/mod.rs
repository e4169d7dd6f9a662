//! Authentication attempt audit log.
//!
//! Every terminal outcome of an authentication transaction produces exactly
//! one [`AuditEntry`]:
//!
//! - `success` once the pipeline commits
//! - `failure` for bad credentials, denials, conflicts and backend errors
//! - `rate_limited` when the attempt was blocked before any remote call
//!
//! Entries are append-only facts; nothing in this crate mutates or deletes
//! them. The pipeline owns the writes, backends never audit on their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::storage::StorageResult;

/// Tracing target used for audit events.
pub const AUDIT_TARGET: &str = "federa::audit";

/// Outcome of one authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The transaction committed and a user was resolved.
    Success,
    /// The transaction aborted.
    Failure,
    /// The attempt was blocked by the rate limiter.
    RateLimited,
}

impl AuditOutcome {
    /// Returns the wire name of the outcome.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::RateLimited => "rate_limited",
        }
    }
}

impl std::fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the outcome was reached.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    /// Backend the attempt went through.
    pub backend: String,

    /// Submitted identifier or provider uid; empty when neither is known.
    pub identifier: String,

    /// The outcome.
    pub outcome: AuditOutcome,

    /// Stable error code for non-success outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(
        backend: impl Into<String>,
        identifier: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            backend: backend.into(),
            identifier: identifier.into(),
            outcome,
            reason: None,
        }
    }

    /// Attaches a reason code.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Append-only sink for audit entries.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be persisted.
    async fn record(&self, entry: AuditEntry) -> StorageResult<()>;
}

/// Audit log that only emits `tracing` events on [`AUDIT_TARGET`].
///
/// Useful when audit persistence is handled by the log pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLog;

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn record(&self, entry: AuditEntry) -> StorageResult<()> {
        emit(&entry);
        Ok(())
    }
}

/// Emits an entry as a structured `tracing` event.
pub fn emit(entry: &AuditEntry) {
    match entry.outcome {
        AuditOutcome::Success => tracing::info!(
            target: AUDIT_TARGET,
            backend = %entry.backend,
            identifier = %entry.identifier,
            outcome = %entry.outcome,
            "authentication attempt"
        ),
        AuditOutcome::Failure | AuditOutcome::RateLimited => tracing::warn!(
            target: AUDIT_TARGET,
            backend = %entry.backend,
            identifier = %entry.identifier,
            outcome = %entry.outcome,
            reason = entry.reason.as_deref().unwrap_or(""),
            "authentication attempt"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&AuditOutcome::RateLimited).unwrap();
        assert_eq!(json, "\"rate_limited\"");
        assert_eq!(AuditOutcome::Success.to_string(), "success");
    }

    #[test]
    fn test_entry_builder() {
        let entry = AuditEntry::new("koha", "12345", AuditOutcome::Failure)
            .with_reason("authentication_failed");
        assert_eq!(entry.backend, "koha");
        assert_eq!(entry.identifier, "12345");
        assert_eq!(entry.reason.as_deref(), Some("authentication_failed"));
    }

    #[tokio::test]
    async fn test_tracing_audit_log_accepts_entries() {
        let log = TracingAuditLog;
        let entry = AuditEntry::new("foli", "matti", AuditOutcome::Success);
        assert!(log.record(entry).await.is_ok());
    }
}
