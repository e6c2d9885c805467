//! Write-behind hit counting over a shared cache.
//!
//! Request handlers add their hits to one counter batch entry in the shared
//! cache and bump a separate hits-since-last-write tally. When the tally
//! reaches the configured threshold, the handler that crossed it flushes the
//! batch to the persistent store before returning.
//!
//! The shared cache offers no lock, so flushers exclude each other with a
//! token written into the batch itself:
//!
//! ```text
//!  read batch ──▶ token set? ──yes──▶ abort (someone else is flushing)
//!       │
//!       ▼
//!  write own token ──▶ sleep(grace) ──▶ re-read ──▶ token still ours? ──no──▶ abort
//!                                                         │
//!                                                        yes
//!                                                         ▼
//!  reset batch + tally ──▶ upsert(today) ──fail──▶ put counts back into batch
//! ```
//!
//! This is a best-effort exclusion: whoever wrote last during the grace
//! period wins. Batch updates are unsynchronized read-modify-write cycles,
//! so concurrent hits can overwrite each other, and a crash between the
//! reset and the upsert loses that batch. Both losses are bounded by one
//! flush epoch.

mod aggregator;
pub mod batch;
mod flusher;

pub use batch::{CounterBatch, FlushToken};

use crate::cache::SharedCache;
use crate::clock::Clock;
use crate::config::{CacheKeys, Config};
use crate::metrics::CounterMetrics;
use crate::store::HitStore;
use std::sync::Arc;
use std::time::Duration;

/// Counts hits into the shared cache and flushes them to the store.
///
/// Cheap to share: every request handler holds an `Arc<HitCounter>`, and
/// all the state that matters lives in the shared cache, not here. A clone
/// is a handful of `Arc`s, which is what lets a flush outlive its caller.
#[derive(Clone)]
pub struct HitCounter {
    cache: Arc<dyn SharedCache>,
    store: Arc<dyn HitStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<CounterMetrics>,
    keys: CacheKeys,
    ttl: Duration,
    flush_after: u64,
    grace_period: Duration,
}

impl HitCounter {
    pub fn new(
        config: &Config,
        cache: Arc<dyn SharedCache>,
        store: Arc<dyn HitStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<CounterMetrics>,
    ) -> Self {
        Self {
            cache,
            store,
            clock,
            metrics,
            keys: config.keys(),
            ttl: config.counter_ttl(),
            flush_after: config.counters.flush_after_x_hits,
            grace_period: config.grace_period(),
        }
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    pub fn metrics(&self) -> &Arc<CounterMetrics> {
        &self.metrics
    }
}
