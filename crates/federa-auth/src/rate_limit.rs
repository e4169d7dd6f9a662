//! Login attempt rate limiting.
//!
//! Attempts are counted per `(backend, identifier)` in a fixed window that
//! opens with the first attempt. The counter is incremented *before* the
//! remote call and compared afterwards, so concurrent attempts can never both
//! slip under the threshold.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::{RateLimitCounter, RateLimitStore, StorageResult};

/// Threshold and window for one backend.
///
/// # Example (TOML)
///
/// ```toml
/// [broker.backends.rate_limit]
/// max_attempts = 5
/// window = "1h"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// Attempts allowed per window; the next one is blocked.
    pub max_attempts: u32,

    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(3600), // 1 hour
        }
    }
}

impl RateLimitPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
        }
    }
}

/// Rate limiter over a shared [`RateLimitStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    /// Creates a limiter.
    #[must_use]
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Counter key for `(backend, identifier)`.
    ///
    /// The identifier is used verbatim: matching is exact and case-sensitive.
    #[must_use]
    pub fn key(backend: &str, identifier: &str) -> String {
        format!("auth:{backend}:{identifier}")
    }

    /// Records one attempt and returns the counter after it.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter store is unavailable.
    pub async fn hit(
        &self,
        backend: &str,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> StorageResult<RateLimitCounter> {
        let key = Self::key(backend, identifier);
        let counter = self
            .store
            .increment(&key, policy.max_attempts, policy.window)
            .await?;
        tracing::debug!(
            backend,
            count = counter.count,
            limit = counter.limit,
            "rate limit counter incremented"
        );
        Ok(counter)
    }

    /// Resets the counter after a successful login.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter store is unavailable.
    pub async fn reset(&self, backend: &str, identifier: &str) -> StorageResult<()> {
        self.store.reset(&Self::key(backend, identifier)).await
    }

    /// Attempts counted in the current window.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter store is unavailable.
    pub async fn attempts(&self, backend: &str, identifier: &str) -> StorageResult<u32> {
        self.store.count(&Self::key(backend, identifier)).await
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}
