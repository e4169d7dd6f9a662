//! Rate-limit counter storage trait.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::StorageResult;

/// Snapshot of one counter right after an operation on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitCounter {
    /// Counter key, `auth:<backend>:<identifier>`.
    pub key: String,

    /// Attempts counted in the current window.
    pub count: u32,

    /// Attempts allowed per window.
    pub limit: u32,

    /// When the current window ends and the counter expires.
    pub expires_at: Instant,
}

impl RateLimitCounter {
    /// Returns `true` once the count has gone past the limit.
    #[must_use]
    pub fn should_block(&self) -> bool {
        self.count > self.limit
    }

    /// Attempts left before blocking.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }

    /// Time until the window ends.
    #[must_use]
    pub fn retry_after(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Storage for ephemeral attempt counters.
///
/// Counters live for one fixed window starting at the first attempt and are
/// gone once it ends. `increment` must be atomic per key: two concurrent
/// callers never observe the same count.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Increments the counter for `key` and returns its new state.
    ///
    /// Starts a new window when the counter is absent or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn increment(&self, key: &str, limit: u32, window: Duration)
    -> StorageResult<RateLimitCounter>;

    /// Resets the counter for `key` to zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn reset(&self, key: &str) -> StorageResult<()>;

    /// Current count for `key`; zero when absent or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn count(&self, key: &str) -> StorageResult<u32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(count: u32) -> RateLimitCounter {
        RateLimitCounter {
            key: "auth:koha:12345".to_string(),
            count,
            limit: 5,
            expires_at: Instant::now() + Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_should_block_only_past_limit() {
        assert!(!counter(1).should_block());
        assert!(!counter(5).should_block());
        assert!(counter(6).should_block());
    }

    #[test]
    fn test_remaining() {
        assert_eq!(counter(2).remaining(), 3);
        assert_eq!(counter(9).remaining(), 0);
    }
}
