pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod counter;
pub mod error;
pub mod ingress;
pub mod listing;
pub mod metrics;
pub mod simulate;
pub mod store;
pub mod types;

pub use cache::{MemorySharedCache, SharedCache};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CliArgs, Config};
pub use counter::{CounterBatch, HitCounter};
pub use error::{MostReadError, MostReadResult};
pub use ingress::{HitIngress, HitRequest};
pub use listing::MostReadCache;
pub use metrics::Metrics;
pub use store::{HitStore, MemoryHitStore};

use std::sync::Arc;

/// Everything a request handler needs, wired to one shared cache and one
/// persistent store.
pub struct MostRead {
    pub counter: Arc<HitCounter>,
    pub listing: Arc<MostReadCache>,
    pub ingress: Arc<HitIngress>,
    pub metrics: Arc<Metrics>,
}

impl MostRead {
    pub fn new(
        config: &Config,
        cache: Arc<dyn SharedCache>,
        store: Arc<dyn HitStore>,
        clock: Arc<dyn Clock>,
    ) -> MostReadResult<Self> {
        config.validate()?;
        tracing::debug!(config = ?config, "Configuration loaded");

        let metrics = Arc::new(Metrics::new());
        let counter = Arc::new(HitCounter::new(
            config,
            Arc::clone(&cache),
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&metrics.counters),
        ));
        let listing = Arc::new(MostReadCache::new(
            config,
            cache,
            store,
            clock,
            Arc::clone(&metrics.listing),
        ));
        let auth = auth::authenticator_from_config(&config.auth)?;
        let ingress = Arc::new(HitIngress::new(Arc::clone(&counter), auth));

        Ok(Self {
            counter,
            listing,
            ingress,
            metrics,
        })
    }

    /// Wire against fresh in-process backends and the system clock.
    pub fn in_memory(config: &Config) -> MostReadResult<(Self, Arc<MemoryHitStore>)> {
        let cache = Arc::new(MemorySharedCache::new(config.cache.max_entries));
        let store = Arc::new(MemoryHitStore::new());
        let app = Self::new(config, cache, store.clone(), Arc::new(SystemClock))?;
        Ok((app, store))
    }
}
