use crate::{CoreError, RateLimitStore};
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::time::Duration;
use tracing::info;

/// Fixed-window counters in Redis, shared by every gateway instance.
#[derive(Clone, Debug)]
pub struct RedisRateLimitStore {
    connection: MultiplexedConnection,
    namespace: String,
}

impl RedisRateLimitStore {
    pub async fn new(redis_url: &str, namespace: &str) -> Result<Self, CoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| CoreError::Configuration(format!("Invalid Redis URL: {}", e)))?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(CoreError::infra)?;
        info!(namespace, "Redis rate limit store connected.");
        Ok(Self::from_connection(connection, namespace))
    }

    pub fn from_connection(connection: MultiplexedConnection, namespace: &str) -> Self {
        Self {
            connection,
            namespace: format!("{}:rl", namespace),
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment_with_expiry(&self, key: &str, window: Duration) -> Result<u64, CoreError> {
        let key = self.namespaced(key);
        let mut conn = self.connection.clone();
        let (count, pttl): (u64, i64) = redis::pipe()
            .atomic()
            .incr(&key, 1u64)
            .cmd("PTTL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(CoreError::infra)?;
        // A counter without expiry was just created (or lost its TTL): open the window.
        if pttl < 0 {
            let window_ms = window.as_millis().max(1) as i64;
            let _: bool = conn
                .pexpire(&key, window_ms)
                .await
                .map_err(CoreError::infra)?;
        }
        Ok(count)
    }

    async fn reset(&self, key: &str) -> Result<(), CoreError> {
        let mut conn = self.connection.clone();
        conn.del(self.namespaced(key))
            .await
            .map(|_: usize| ())
            .map_err(CoreError::infra)
    }

    async fn clear(&self) -> Result<(), CoreError> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}:*", self.namespace);
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(CoreError::infra)?;
            if !keys.is_empty() {
                let _: usize = conn.del(keys).await.map_err(CoreError::infra)?;
            }
            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }
}
