//! Shared wiring for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use most_read::store::PopularItem;
use most_read::types::ItemId;
use most_read::{
    Config, FixedClock, HitStore, MemoryHitStore, MemorySharedCache, MostRead, MostReadError,
    MostReadResult,
};

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

/// Config with no grace period to speak of, so flushes finish quickly.
pub fn create_test_config(flush_after: u64) -> Config {
    let mut config = Config::default();
    config.counters.flush_after_x_hits = flush_after;
    config.counters.flush_grace_period_ms = 5;
    config
}

/// Memory store whose upserts fail while `failing` is set.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryHitStore,
    failing: AtomicBool,
    pub upsert_calls: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl HitStore for FlakyStore {
    async fn upsert_hits(&self, date: NaiveDate, counts: &[(ItemId, u64)]) -> MostReadResult<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(MostReadError::Persistence("connection refused".into()));
        }
        self.inner.upsert_hits(date, counts).await
    }

    async fn top_items(&self, after: NaiveDate, limit: usize) -> MostReadResult<Vec<PopularItem>> {
        self.inner.top_items(after, limit).await
    }
}

/// A wired `MostRead` over a memory cache, a flaky store and a fixed clock.
pub struct TestEnvironment {
    pub app: MostRead,
    pub cache: Arc<MemorySharedCache>,
    pub store: Arc<FlakyStore>,
    pub config: Config,
}

impl TestEnvironment {
    pub fn new(config: Config) -> Self {
        let cache = Arc::new(MemorySharedCache::new(config.cache.max_entries));
        let store = Arc::new(FlakyStore::new());
        let app = MostRead::new(
            &config,
            cache.clone(),
            store.clone(),
            Arc::new(FixedClock(today())),
        )
        .unwrap();
        Self {
            app,
            cache,
            store,
            config,
        }
    }

    pub fn with_threshold(flush_after: u64) -> Self {
        Self::new(create_test_config(flush_after))
    }

    /// Sum of pending batch counts, zero when there is no batch.
    pub async fn pending_total(&self) -> u64 {
        self.app
            .counter
            .pending_batch()
            .await
            .unwrap()
            .map(|b| b.total())
            .unwrap_or(0)
    }
}
