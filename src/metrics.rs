use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Metrics for hit aggregation and the write-behind flush
#[derive(Debug, Default)]
pub struct CounterMetrics {
    /// Hits written into the shared counter batch
    pub hits_recorded: AtomicU64,
    /// Hits dropped because the batch could not be updated
    pub hits_dropped: AtomicU64,
    /// Counter batches created after a cold or expired cache
    pub batch_creates: AtomicU64,
    /// Create-if-absent calls that lost to another handler
    pub cache_races: AtomicU64,
    /// Reads that found an entry of the wrong shape
    pub malformed_state: AtomicU64,
    /// Flushes started by the threshold trigger
    pub flush_attempts: AtomicU64,
    /// Flushes whose upsert succeeded
    pub flushes_persisted: AtomicU64,
    /// Flushes that gave up before touching the store
    pub flushes_aborted: AtomicU64,
    /// Upserts that failed and were reintegrated
    pub upsert_failures: AtomicU64,
    /// Hits written to the persistent store
    pub hits_persisted: AtomicU64,
    /// Hits put back into the batch after a failed upsert
    pub hits_reintegrated: AtomicU64,
    /// Total time spent inside flushes, grace period included (nanoseconds)
    pub flush_latency_ns: AtomicU64,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hits(&self, amount: u64) {
        self.hits_recorded.fetch_add(amount, Ordering::Relaxed);
        trace!(counter_op = "hit", amount = amount);
    }

    pub fn record_dropped(&self, amount: u64) {
        self.hits_dropped.fetch_add(amount, Ordering::Relaxed);
        debug!(counter_op = "dropped", amount = amount);
    }

    pub fn record_batch_created(&self) {
        self.batch_creates.fetch_add(1, Ordering::Relaxed);
        trace!(counter_op = "batch_created");
    }

    pub fn record_cache_race(&self, key: &str) {
        self.cache_races.fetch_add(1, Ordering::Relaxed);
        debug!(counter_op = "cache_race", key = key);
    }

    pub fn record_malformed(&self, key: &str) {
        self.malformed_state.fetch_add(1, Ordering::Relaxed);
        warn!(counter_op = "malformed_state", key = key);
    }

    pub fn record_flush_attempt(&self) {
        self.flush_attempts.fetch_add(1, Ordering::Relaxed);
        trace!(counter_op = "flush_attempt");
    }

    pub fn record_flush_persisted(&self, hits: u64, latency: Duration) {
        self.flushes_persisted.fetch_add(1, Ordering::Relaxed);
        self.hits_persisted.fetch_add(hits, Ordering::Relaxed);
        self.flush_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        trace!(
            counter_op = "flush_persisted",
            hits = hits,
            latency_ms = latency.as_millis() as u64
        );
    }

    pub fn record_flush_aborted(&self, reason: &'static str) {
        self.flushes_aborted.fetch_add(1, Ordering::Relaxed);
        debug!(counter_op = "flush_aborted", reason = reason);
    }

    pub fn record_upsert_failure(&self, hits: u64) {
        self.upsert_failures.fetch_add(1, Ordering::Relaxed);
        self.hits_reintegrated.fetch_add(hits, Ordering::Relaxed);
        debug!(counter_op = "upsert_failure", hits = hits);
    }

    /// Average duration of a persisted flush in milliseconds
    pub fn avg_flush_ms(&self) -> f64 {
        let count = self.flushes_persisted.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total_ns = self.flush_latency_ns.load(Ordering::Relaxed);
        (total_ns as f64 / count as f64) / 1_000_000.0
    }

    /// Log a summary of counter metrics
    pub fn log_summary(&self, elapsed_secs: f64) {
        info!(
            operation = "counter_metrics_summary",
            hits_recorded = self.hits_recorded.load(Ordering::Relaxed),
            hits_dropped = self.hits_dropped.load(Ordering::Relaxed),
            batch_creates = self.batch_creates.load(Ordering::Relaxed),
            cache_races = self.cache_races.load(Ordering::Relaxed),
            malformed_state = self.malformed_state.load(Ordering::Relaxed),
            flush_attempts = self.flush_attempts.load(Ordering::Relaxed),
            flushes_persisted = self.flushes_persisted.load(Ordering::Relaxed),
            flushes_aborted = self.flushes_aborted.load(Ordering::Relaxed),
            upsert_failures = self.upsert_failures.load(Ordering::Relaxed),
            hits_persisted = self.hits_persisted.load(Ordering::Relaxed),
            hits_reintegrated = self.hits_reintegrated.load(Ordering::Relaxed),
            avg_flush_ms = self.avg_flush_ms(),
            duration_secs = elapsed_secs,
        );
    }
}

/// Metrics for the most-read listing cache
#[derive(Debug, Default)]
pub struct ListingMetrics {
    /// Renderings served straight from the shared cache
    pub cache_hits: AtomicU64,
    /// Requests that found no usable rendering
    pub cache_misses: AtomicU64,
    /// Listings rendered from a store query
    pub renders: AtomicU64,
    /// Fresh renderings served without being cached
    pub uncached_fallbacks: AtomicU64,
    /// Top-items queries that failed
    pub query_failures: AtomicU64,
}

impl ListingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_render(&self, rows: usize) {
        self.renders.fetch_add(1, Ordering::Relaxed);
        trace!(listing_op = "render", rows = rows);
    }

    pub fn record_uncached(&self) {
        self.uncached_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query_failure(&self, error: &str) {
        self.query_failures.fetch_add(1, Ordering::Relaxed);
        debug!(listing_op = "query_failure", error = error);
    }

    /// Get hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        (hits as f64 / total as f64) * 100.0
    }

    pub fn log_summary(&self) {
        info!(
            operation = "listing_metrics_summary",
            cache_hits = self.cache_hits.load(Ordering::Relaxed),
            cache_misses = self.cache_misses.load(Ordering::Relaxed),
            hit_rate_pct = self.hit_rate(),
            renders = self.renders.load(Ordering::Relaxed),
            uncached_fallbacks = self.uncached_fallbacks.load(Ordering::Relaxed),
            query_failures = self.query_failures.load(Ordering::Relaxed),
        );
    }
}

/// Combined metrics for the entire system
pub struct Metrics {
    pub counters: Arc<CounterMetrics>,
    pub listing: Arc<ListingMetrics>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(CounterMetrics::new()),
            listing: Arc::new(ListingMetrics::new()),
            start_time: Instant::now(),
        }
    }

    /// Log a complete metrics summary
    pub fn log_full_summary(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        info!("=== most-read Metrics Summary ===");
        self.counters.log_summary(elapsed);
        self.listing.log_summary();
        info!("=================================");
    }

    /// Get elapsed time since metrics creation
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
