use crate::{CoreError, RateLimitStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct RateLimitCounter {
    count: u64,
    window_reset_at: Instant,
}

/// Fixed-window counters held in process memory.
///
/// Counts are not shared between instances: each gateway process enforces its
/// own limit. Use the Redis store when limits must hold across a fleet.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateLimitStore {
    counters: Arc<DashMap<String, RateLimitCounter>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops counters whose window has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, c| c.window_reset_at > now);
        before - self.counters.len()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn increment_with_expiry(&self, key: &str, window: Duration) -> Result<u64, CoreError> {
        let now = Instant::now();
        // The entry guard holds the shard lock, making read-modify-write atomic per key.
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert(RateLimitCounter {
                count: 0,
                window_reset_at: now + window,
            });
        if entry.window_reset_at <= now {
            entry.count = 0;
            entry.window_reset_at = now + window;
        }
        entry.count += 1;
        Ok(entry.count)
    }

    async fn reset(&self, key: &str) -> Result<(), CoreError> {
        self.counters.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CoreError> {
        self.counters.clear();
        Ok(())
    }
}
