use crate::RateLimitStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed-window admission control over a pluggable counter store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Counts one request against `key` and reports whether it must be rejected
    /// (`true` = blocked). The first `limit` calls in a window are admitted.
    ///
    /// A store failure admits the request: losing the limiter must not take the
    /// endpoint down with it.
    pub async fn admit(&self, key: &str, limit: u64, window: Duration) -> bool {
        match self.store.increment_with_expiry(key, window).await {
            Ok(count) if count > limit => {
                debug!(key, count, limit, "rate limit exceeded");
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(key, "rate limit store unavailable, admitting request: {}", e);
                false
            }
        }
    }

    pub async fn reset(&self, key: &str) {
        if let Err(e) = self.store.reset(key).await {
            warn!(key, "failed to reset rate limit counter: {}", e);
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            warn!("failed to clear rate limit counters: {}", e);
        }
    }
}
