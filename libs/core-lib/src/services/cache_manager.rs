use crate::Cache;
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::borrow::Cow;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-resource freshness windows.
pub struct CacheTtl;

impl CacheTtl {
    pub const TENANT_INFO: Duration = Duration::from_secs(300);
    pub const TENANT_AGENTS: Duration = Duration::from_secs(300);
    pub const TENANTS_LIST: Duration = Duration::from_secs(300);
    pub const COMMANDS_LIST: Duration = Duration::from_secs(60);
}

/// Builds a deterministic key: `resource:identifier[:name:value|name:value...]`,
/// params sorted by name, absent params omitted. The identifier and values are
/// escaped so a `:` or `|` inside them cannot forge another key.
pub fn cache_key(resource: &str, identifier: &str, params: &[(&str, Option<String>)]) -> String {
    let mut present: Vec<(&str, &String)> = params
        .iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| (*name, v)))
        .collect();
    present.sort_by(|a, b| a.0.cmp(b.0));

    let mut key = format!("{}:{}", resource, escape_key_part(identifier));
    if !present.is_empty() {
        let joined: Vec<String> = present
            .iter()
            .map(|(name, value)| format!("{}:{}", name, escape_key_part(value)))
            .collect();
        key.push(':');
        key.push_str(&joined.join("|"));
    }
    key
}

// Percent-encodes the key separators and the escape character itself.
fn escape_key_part(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['%', ':', '|']) {
        return Cow::Borrowed(raw);
    }
    let mut escaped = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            '|' => escaped.push_str("%7C"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

/// Envelope persisted in the backend. Freshness is judged from these fields,
/// so an entry the backend has not yet evicted is still ignored once stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub written_at_ms: i64,
    pub ttl_ms: u64,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.written_at_ms) < self.ttl_ms as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

/// Cache-aside reader over a pluggable key-value backend.
///
/// Backend failures never surface to callers: a failed read is a miss and a
/// failed write is logged. Only the fetcher's own error propagates.
#[derive(Clone)]
pub struct CacheManager {
    name: String,
    backend: Arc<dyn Cache>,
    counters: Arc<Counters>,
}

impl CacheManager {
    pub fn new(name: impl Into<String>, backend: Arc<dyn Cache>) -> Self {
        Self {
            name: name.into(),
            backend,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Returns the fresh cached value for `key`, if any. Never fetches.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.record_miss(key, "absent");
                return None;
            }
            Err(e) => {
                warn!(cache = %self.name, key, "cache read failed, treating as miss: {}", e);
                self.record_miss(key, "backend error");
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(cache = %self.name, key, "undecodable cache entry, treating as miss: {}", e);
                self.record_miss(key, "corrupt");
                return None;
            }
        };

        if !entry.is_fresh(now_ms()) {
            self.record_miss(key, "stale");
            return None;
        }

        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        debug!(cache = %self.name, key, "cache hit");
        Some(entry.data)
    }

    /// Stores `value` under `key` for `ttl`.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let entry = CacheEntry {
            data: value,
            written_at_ms: now_ms(),
            ttl_ms: ttl.as_millis() as u64,
        };
        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(cache = %self.name, key, "value not cacheable: {}", e);
                return;
            }
        };
        // Backend TTL rounds up so the backend never evicts before the entry goes stale.
        let ttl_seconds = ttl.as_millis().div_ceil(1000).max(1) as u64;
        match self.backend.set(key, &bytes, Some(ttl_seconds)).await {
            Ok(()) => {
                self.counters.sets.fetch_add(1, Ordering::Relaxed);
                debug!(cache = %self.name, key, ttl_ms = entry.ttl_ms, "cache set");
            }
            Err(e) => warn!(cache = %self.name, key, "cache write failed: {}", e),
        }
    }

    /// Cache-aside read: a fresh entry is returned without calling `fetcher`;
    /// otherwise `fetcher` runs and its successful result is cached. A fetcher
    /// error is returned as-is and nothing is cached.
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &str, ttl: Duration, fetcher: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }
        debug!(cache = %self.name, key, "cache miss, fetching from source");
        let value = fetcher().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    pub async fn exists(&self, key: &str) -> bool {
        // Presence alone is not enough: a stale entry is logically absent.
        self.get::<serde_json::Value>(key).await.is_some()
    }

    pub async fn invalidate(&self, key: &str) {
        match self.backend.delete(key).await {
            Ok(()) => {
                self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                debug!(cache = %self.name, key, "cache invalidated");
            }
            Err(e) => warn!(cache = %self.name, key, "cache invalidation failed: {}", e),
        }
    }

    /// Drops every key starting with `prefix`, e.g. all pages of a listing.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        match self.backend.delete_prefix(prefix).await {
            Ok(()) => {
                self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                debug!(cache = %self.name, prefix, "cache prefix invalidated");
            }
            Err(e) => warn!(cache = %self.name, prefix, "cache prefix invalidation failed: {}", e),
        }
    }

    pub async fn invalidate_all(&self) {
        match self.backend.clear().await {
            Ok(()) => {
                self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                debug!(cache = %self.name, "cache cleared");
            }
            Err(e) => warn!(cache = %self.name, "cache clear failed: {}", e),
        }
    }

    pub fn metrics(&self) -> CacheMetrics {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheMetrics {
            hits,
            misses,
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            hit_rate: if total > 0 {
                hits as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    pub fn reset_metrics(&self) {
        self.counters.hits.store(0, Ordering::Relaxed);
        self.counters.misses.store(0, Ordering::Relaxed);
        self.counters.sets.store(0, Ordering::Relaxed);
        self.counters.deletes.store(0, Ordering::Relaxed);
    }

    fn record_miss(&self, key: &str, reason: &str) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(cache = %self.name, key, reason, "cache miss");
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory_cache::InMemoryCache;
    use crate::CoreError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn manager() -> CacheManager {
        CacheManager::new("test", Arc::new(InMemoryCache::default()))
    }

    #[tokio::test]
    async fn set_then_get_within_ttl_returns_value() {
        let cache = manager();
        cache.set("k", &"v".to_string(), Duration::from_secs(60)).await;
        assert_eq!(cache.get::<String>("k").await, Some("v".to_string()));
        assert!(cache.exists("k").await);
    }

    #[tokio::test]
    async fn get_or_set_fetches_once_within_ttl() {
        let cache = manager();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Result<u32, CoreError> = cache
                .get_or_set("answer", Duration::from_secs(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await;
            assert_eq!(value.unwrap(), 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let m = cache.metrics();
        assert_eq!(m.hits, 1);
        assert_eq!(m.sets, 1);
    }

    #[tokio::test]
    async fn stale_entry_triggers_exactly_one_more_fetch() {
        let cache = manager();
        let calls = AtomicUsize::new(0);
        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CoreError>("fresh".to_string())
        };

        cache
            .get_or_set("k", Duration::from_millis(50), fetch)
            .await
            .unwrap();
        sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get::<String>("k").await, None);

        cache
            .get_or_set("k", Duration::from_millis(50), fetch)
            .await
            .unwrap();
        cache
            .get_or_set("k", Duration::from_millis(50), fetch)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetcher_error_propagates_and_is_not_cached() {
        let cache = manager();
        let failed: Result<String, CoreError> = cache
            .get_or_set("k", Duration::from_secs(60), || async {
                Err(CoreError::NotFound("tenant".into()))
            })
            .await;
        assert!(matches!(failed, Err(CoreError::NotFound(_))));
        assert_eq!(cache.get::<String>("k").await, None);

        let ok: Result<String, CoreError> = cache
            .get_or_set("k", Duration::from_secs(60), || async { Ok("v".to_string()) })
            .await;
        assert_eq!(ok.unwrap(), "v");
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let cache = manager();
        cache.set("a", &1u8, Duration::from_secs(60)).await;
        cache.set("b", &2u8, Duration::from_secs(60)).await;

        cache.invalidate("a").await;
        assert_eq!(cache.get::<u8>("a").await, None);
        assert_eq!(cache.get::<u8>("b").await, Some(2));

        cache.invalidate_all().await;
        assert_eq!(cache.get::<u8>("b").await, None);
    }

    #[tokio::test]
    async fn invalidate_prefix_only_drops_matching_keys() {
        let cache = manager();
        cache.set("commands:list:a", &1u8, Duration::from_secs(60)).await;
        cache.set("commands:list:b", &2u8, Duration::from_secs(60)).await;
        cache.set("tenants:list:a", &3u8, Duration::from_secs(60)).await;

        cache.invalidate_prefix("commands:list").await;

        assert_eq!(cache.get::<u8>("commands:list:a").await, None);
        assert_eq!(cache.get::<u8>("commands:list:b").await, None);
        assert_eq!(cache.get::<u8>("tenants:list:a").await, Some(3));
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss() {
        let backend = Arc::new(InMemoryCache::default());
        backend.set("k", b"not json", None).await.unwrap();
        let cache = CacheManager::new("test", backend);
        assert_eq!(cache.get::<String>("k").await, None);
        assert_eq!(cache.metrics().misses, 1);
    }

    struct BrokenBackend;

    #[async_trait]
    impl Cache for BrokenBackend {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CoreError> {
            Err(CoreError::Internal("down".into()))
        }
        async fn set(&self, _: &str, _: &[u8], _: Option<u64>) -> Result<(), CoreError> {
            Err(CoreError::Internal("down".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), CoreError> {
            Err(CoreError::Internal("down".into()))
        }
        async fn delete_prefix(&self, _prefix: &str) -> Result<(), CoreError> {
            Err(CoreError::Internal("down".into()))
        }
        async fn clear(&self) -> Result<(), CoreError> {
            Err(CoreError::Internal("down".into()))
        }
    }

    #[tokio::test]
    async fn backend_failure_falls_through_to_fetcher() {
        let cache = CacheManager::new("broken", Arc::new(BrokenBackend));
        let value: Result<u32, CoreError> = cache
            .get_or_set("k", Duration::from_secs(1), || async { Ok(7) })
            .await;
        assert_eq!(value.unwrap(), 7);
        cache.invalidate("k").await;
    }

    #[test]
    fn cache_key_is_order_independent_and_skips_absent_params() {
        let a = cache_key(
            "tenants",
            "list",
            &[
                ("status", Some("active".into())),
                ("limit", Some("50".into())),
                ("plan", None),
            ],
        );
        let b = cache_key(
            "tenants",
            "list",
            &[
                ("limit", Some("50".into())),
                ("plan", None),
                ("status", Some("active".into())),
            ],
        );
        assert_eq!(a, b);
        assert_eq!(a, "tenants:list:limit:50|status:active");
        assert_eq!(cache_key("tenant", "t-1", &[]), "tenant:t-1");
    }

    #[test]
    fn separators_inside_values_cannot_collide_with_other_params() {
        let smuggled = cache_key(
            "tenants",
            "list",
            &[("plan", Some("professional|search:Acme".into()))],
        );
        let genuine = cache_key(
            "tenants",
            "list",
            &[
                ("plan", Some("professional".into())),
                ("search", Some("Acme".into())),
            ],
        );
        assert_ne!(smuggled, genuine);
        assert_eq!(smuggled, "tenants:list:plan:professional%7Csearch%3AAcme");

        // The escape character is itself escaped.
        assert_ne!(
            cache_key("tenants", "list", &[("search", Some("a%7Cb".into()))]),
            cache_key("tenants", "list", &[("search", Some("a|b".into()))])
        );
        assert_ne!(
            cache_key("tenant", "t-1:status:x", &[]),
            cache_key("tenant", "t-1", &[("status", Some("x".into()))])
        );
    }

    #[tokio::test]
    async fn every_invalidation_counts_as_a_delete() {
        let cache = manager();
        cache.set("a", &1u8, Duration::from_secs(60)).await;

        cache.invalidate("a").await;
        cache.invalidate_prefix("commands:list").await;
        cache.invalidate_all().await;
        assert_eq!(cache.metrics().deletes, 3);

        cache.reset_metrics();
        assert_eq!(cache.metrics().deletes, 0);
    }

    #[tokio::test]
    async fn failed_clear_is_not_counted() {
        let cache = CacheManager::new("broken", Arc::new(BrokenBackend));
        cache.invalidate_all().await;
        assert_eq!(cache.metrics().deletes, 0);
    }
}
