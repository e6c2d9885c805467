use super::SharedCache;
use crate::error::MostReadResult;
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::Expiry;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

/// A stored value together with the TTL it was written with.
#[derive(Debug)]
struct Stored {
    value: Value,
    ttl: Duration,
}

/// Expiry policy that reads each entry's own TTL. Every write restarts the
/// clock, the same as a memcached `set`.
struct PerEntryTtl;

impl PerEntryTtl {
    fn ttl_of(stored: &Stored) -> Option<Duration> {
        if stored.ttl.is_zero() {
            None
        } else {
            Some(stored.ttl)
        }
    }
}

impl Expiry<String, Arc<Stored>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<Stored>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Self::ttl_of(value)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<Stored>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Self::ttl_of(value)
    }
}

/// In-process shared cache for single-process deployments and tests.
///
/// Backed by `moka`, which provides:
/// - Atomic create-if-absent through its entry API
/// - Per-entry expiration through an `Expiry` policy
/// - Bounded capacity with TinyLFU eviction
/// - High concurrency with lock-free reads
///
/// Every clone of the `Arc` that holds it sees the same entries, which is
/// what lets many tasks stand in for many request handlers.
pub struct MemorySharedCache {
    /// The underlying moka cache
    inner: MokaCache<String, Arc<Stored>>,
    /// Statistics counters
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemorySharedCache {
    /// Create a new cache holding at most `max_entries` entries
    pub fn new(max_entries: u64) -> Self {
        let inner = MokaCache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();

        Self {
            inner,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Drop every entry, as if the cache service had restarted
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        self.inner.run_pending_tasks().await;
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.inner.entry_count() as usize,
        }
    }
}

impl Default for MemorySharedCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl SharedCache for MemorySharedCache {
    async fn get(&self, key: &str) -> MostReadResult<Option<Value>> {
        match self.inner.get(key).await {
            Some(stored) => {
                trace!(key = key, "Cache hit");
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(stored.value.clone()))
            }
            None => {
                trace!(key = key, "Cache miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn add(&self, key: &str, value: Value, ttl: Duration) -> MostReadResult<bool> {
        let stored = Arc::new(Stored { value, ttl });
        let entry = self
            .inner
            .entry(key.to_string())
            .or_insert_with(async move { stored })
            .await;
        trace!(key = key, created = entry.is_fresh(), "Cache add");
        Ok(entry.is_fresh())
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> MostReadResult<()> {
        self.inner
            .insert(key.to_string(), Arc::new(Stored { value, ttl }))
            .await;
        trace!(key = key, "Cache set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_cache_basic_operations() {
        let cache = MemorySharedCache::new(10);

        cache.set("key1", json!(42), MINUTE).await.unwrap();
        assert_eq!(cache.get("key1").await.unwrap(), Some(json!(42)));

        assert_eq!(cache.get("key2").await.unwrap(), None);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn test_add_only_creates_once() {
        let cache = MemorySharedCache::new(10);

        assert!(cache.add("key1", json!("first"), MINUTE).await.unwrap());
        assert!(!cache.add("key1", json!("second"), MINUTE).await.unwrap());
        assert_eq!(cache.get("key1").await.unwrap(), Some(json!("first")));
    }

    #[tokio::test]
    async fn test_set_overwrites_added_entry() {
        let cache = MemorySharedCache::new(10);

        cache.add("key1", json!(1), MINUTE).await.unwrap();
        cache.set("key1", json!(2), MINUTE).await.unwrap();
        assert_eq!(cache.get("key1").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_per_entry_ttl() {
        let cache = MemorySharedCache::new(10);

        cache
            .set("short", json!(1), Duration::from_millis(50))
            .await
            .unwrap();
        cache.set("long", json!(2), MINUTE).await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
        assert_eq!(cache.get("long").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_add_succeeds_after_expiry() {
        let cache = MemorySharedCache::new(10);

        assert!(cache
            .add("key1", json!(1), Duration::from_millis(50))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.add("key1", json!(2), MINUTE).await.unwrap());
        assert_eq!(cache.get("key1").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let cache = MemorySharedCache::new(10);

        cache.set("key1", json!(true), Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("key1").await.unwrap(), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_cache_clear() {
        let cache = MemorySharedCache::new(10);

        cache.set("key1", json!(1), MINUTE).await.unwrap();
        cache.set("key2", json!(2), MINUTE).await.unwrap();

        cache.clear();

        assert_eq!(cache.get("key1").await.unwrap(), None);
        assert_eq!(cache.get("key2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_add_has_one_winner() {
        use tokio::task;

        let cache = Arc::new(MemorySharedCache::new(100));
        let mut handles = vec![];

        for i in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(task::spawn(async move {
                cache.add("contended", json!(i), MINUTE).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
