use crate::{Cache, CoreError};
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tracing::{debug, info};

const SCAN_BATCH: usize = 200;

/// Redis implementation of the Cache port using redis-rs.
///
/// Every key is stored under `<namespace>:` so that `clear` only touches
/// entries owned by this cache, never the whole database.
#[derive(Clone, Debug)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    namespace: String,
    default_ttl_seconds: u64,
}

impl RedisCache {
    pub async fn new(
        redis_url: &str,
        namespace: &str,
        default_ttl_seconds: u64,
    ) -> Result<Self, CoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| CoreError::Configuration(format!("Invalid Redis URL: {}", e)))?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(CoreError::infra)?;
        info!(namespace, "Redis cache connected.");
        Ok(Self::from_connection(connection, namespace, default_ttl_seconds))
    }

    pub fn from_connection(
        connection: MultiplexedConnection,
        namespace: &str,
        default_ttl_seconds: u64,
    ) -> Self {
        Self {
            connection,
            namespace: namespace.to_string(),
            default_ttl_seconds,
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// SCAN + DEL over every key matching `pattern`. SCAN is incremental, so a
    /// large keyspace does not block the server the way KEYS would.
    async fn delete_matching(&self, pattern: &str) -> Result<(), CoreError> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut removed = 0usize;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(CoreError::infra)?;
            if !keys.is_empty() {
                removed += keys.len();
                let _: usize = conn.del(keys).await.map_err(CoreError::infra)?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!(pattern, removed, "Redis cache keys deleted");
        Ok(())
    }
}

/// Escapes glob metacharacters so a literal prefix can be used in MATCH.
fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        let mut conn = self.connection.clone();
        conn.get(self.namespaced(key))
            .await
            .map_err(CoreError::infra)
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: Option<u64>,
    ) -> Result<(), CoreError> {
        let mut conn = self.connection.clone();
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);
        conn.set_ex(self.namespaced(key), value, ttl)
            .await
            .map_err(CoreError::infra)
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        let mut conn = self.connection.clone();
        conn.del(self.namespaced(key))
            .await
            .map(|_: usize| ())
            .map_err(CoreError::infra)
    }

    async fn exists(&self, key: &str) -> Result<bool, CoreError> {
        let mut conn = self.connection.clone();
        conn.exists(self.namespaced(key))
            .await
            .map_err(CoreError::infra)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), CoreError> {
        let pattern = format!("{}*", escape_glob(&self.namespaced(prefix)));
        self.delete_matching(&pattern).await
    }

    async fn clear(&self) -> Result<(), CoreError> {
        let pattern = format!("{}:*", escape_glob(&self.namespace));
        self.delete_matching(&pattern).await
    }
}
