//! In-memory audit log.

use async_trait::async_trait;
use federa_auth::audit::{self, AuditEntry, AuditLog, AuditOutcome};
use federa_auth::storage::StorageResult;
use tokio::sync::RwLock;

/// Append-only audit log kept in memory.
///
/// Entries are also emitted as `tracing` events.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in insertion order.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    /// Entries for one `(backend, identifier)` pair.
    pub async fn entries_for(&self, backend: &str, identifier: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.backend == backend && e.identifier == identifier)
            .cloned()
            .collect()
    }

    /// Number of entries with `outcome`.
    pub async fn count(&self, outcome: AuditOutcome) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.outcome == outcome)
            .count()
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if nothing was recorded.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> StorageResult<()> {
        audit::emit(&entry);
        self.entries.write().await.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_filter() {
        let log = InMemoryAuditLog::new();
        log.record(AuditEntry::new("koha", "12345", AuditOutcome::Failure).with_reason("authentication_failed"))
            .await
            .unwrap();
        log.record(AuditEntry::new("koha", "12345", AuditOutcome::Success))
            .await
            .unwrap();
        log.record(AuditEntry::new("foli", "12345", AuditOutcome::RateLimited))
            .await
            .unwrap();

        assert_eq!(log.len().await, 3);
        let koha = log.entries_for("koha", "12345").await;
        assert_eq!(koha.len(), 2);
        assert_eq!(koha[0].reason.as_deref(), Some("authentication_failed"));
        assert_eq!(log.count(AuditOutcome::RateLimited).await, 1);
    }
}
