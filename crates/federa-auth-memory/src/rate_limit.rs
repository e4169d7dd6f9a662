//! In-memory attempt counters.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use federa_auth::storage::{RateLimitCounter, RateLimitStore, StorageResult};

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    expires_at: Instant,
}

impl Window {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Fixed-window counters in a [`DashMap`].
///
/// `increment` holds the key's entry lock across read, expiry check and
/// write, so concurrent attempts for one key are counted exactly once each.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    windows: DashMap<String, Window>,
}

impl InMemoryRateLimitStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired counters. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_expired(now));
        let removed = before - self.windows.len();
        if removed > 0 {
            tracing::debug!(removed, "purged expired rate limit counters");
        }
        removed
    }

    /// Number of live and expired counters held.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns `true` if no counters are held.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn increment(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> StorageResult<RateLimitCounter> {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            expires_at: now + window,
        });
        if entry.is_expired(now) {
            *entry = Window {
                count: 0,
                expires_at: now + window,
            };
        }
        entry.count = entry.count.saturating_add(1);

        Ok(RateLimitCounter {
            key: key.to_string(),
            count: entry.count,
            limit,
            expires_at: entry.expires_at,
        })
    }

    async fn reset(&self, key: &str) -> StorageResult<()> {
        self.windows.remove(key);
        Ok(())
    }

    async fn count(&self, key: &str) -> StorageResult<u32> {
        let now = Instant::now();
        Ok(self
            .windows
            .get(key)
            .filter(|window| !window.is_expired(now))
            .map_or(0, |window| window.count))
    }
}
