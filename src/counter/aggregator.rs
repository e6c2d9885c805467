use super::batch::{tally_from_value, CounterBatch};
use super::HitCounter;
use crate::error::{MostReadError, MostReadResult};
use crate::types::{DropReason, ItemId, RecordOutcome};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

impl HitCounter {
    /// Count one hit for `item_id`.
    pub async fn record_hit(&self, item_id: ItemId) -> RecordOutcome {
        self.record_hit_with(item_id, 1, false).await
    }

    /// Add `amount` hits for `item_id` to the shared batch.
    ///
    /// Unless `suppress_tally` is set, the hits also count toward the flush
    /// threshold, and the call flushes inline once the threshold is
    /// reached. Cache failures are logged and reported in the outcome,
    /// never returned as errors.
    #[instrument(skip(self), fields(counter_op = "record_hit"))]
    pub async fn record_hit_with(
        &self,
        item_id: ItemId,
        amount: u64,
        suppress_tally: bool,
    ) -> RecordOutcome {
        if let Err(e) = self.increment(item_id, amount, suppress_tally).await {
            self.metrics.record_dropped(amount);
            return RecordOutcome::Dropped(DropReason::from(&e));
        }
        if suppress_tally {
            return RecordOutcome::Recorded { flush: None };
        }

        let flush = match self.hits_since_write().await {
            Ok(tally) if tally >= self.flush_after => {
                info!(
                    key = %self.keys.counters,
                    tally,
                    threshold = self.flush_after,
                    "Writing cached counters to the store"
                );
                Some(self.flush_detached().await)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(key = %self.keys.hits_since_write, error = %e, "Could not read hit tally");
                None
            }
        };
        RecordOutcome::Recorded { flush }
    }

    /// The increment path shared by new hits and flush reintegration: add
    /// to the batch and, unless suppressed, to the tally. Never flushes.
    pub(super) async fn increment(
        &self,
        item_id: ItemId,
        amount: u64,
        suppress_tally: bool,
    ) -> MostReadResult<()> {
        if let Err(e) = self.add_to_batch(item_id, amount).await {
            if matches!(e, MostReadError::MalformedState { .. }) {
                self.metrics.record_malformed(&self.keys.counters);
            }
            warn!(key = %self.keys.counters, item_id, amount, error = %e, "Hit not counted");
            return Err(e);
        }
        self.metrics.record_hits(amount);

        if !suppress_tally {
            if let Err(e) = self.add_to_tally(amount).await {
                warn!(
                    key = %self.keys.hits_since_write,
                    amount,
                    error = %e,
                    "Could not increment the hits-since-last-write tally"
                );
            }
        }
        Ok(())
    }

    /// Current contents of the shared batch, if any.
    pub async fn pending_batch(&self) -> MostReadResult<Option<CounterBatch>> {
        let key = &self.keys.counters;
        match self.cache.get(key).await? {
            Some(value) => CounterBatch::from_value(key, &value).map(Some),
            None => Ok(None),
        }
    }

    /// Hits counted since the last successful flush. An absent tally reads
    /// as zero.
    pub async fn hits_since_write(&self) -> MostReadResult<u64> {
        let key = &self.keys.hits_since_write;
        match self.cache.get(key).await? {
            Some(value) => tally_from_value(key, &value),
            None => Ok(0),
        }
    }

    async fn add_to_batch(&self, item_id: ItemId, amount: u64) -> MostReadResult<()> {
        let key = &self.keys.counters;
        let mut batch = match self.pending_batch().await? {
            Some(batch) => batch,
            None => {
                let fresh = CounterBatch::with_hit(item_id, amount);
                if self.cache.add(key, fresh.to_value()?, self.ttl).await? {
                    self.metrics.record_batch_created();
                    info!(key = %key, ttl_secs = self.ttl.as_secs(), "Created cache counters");
                    return Ok(());
                }
                self.metrics.record_cache_race(key);
                self.pending_batch().await?.ok_or_else(|| {
                    MostReadError::CacheUnavailable(format!(
                        "{key} absent after losing the create race"
                    ))
                })?
            }
        };

        batch.add(item_id, amount);
        debug!(key = %key, item_id, count = batch.count(item_id), "Incremented counter");
        self.cache.set(key, batch.to_value()?, self.ttl).await
    }

    async fn add_to_tally(&self, amount: u64) -> MostReadResult<()> {
        let key = &self.keys.hits_since_write;
        let current = match self.cache.get(key).await? {
            Some(value) => tally_from_value(key, &value)?,
            None => {
                if self.cache.add(key, Value::from(amount), self.ttl).await? {
                    info!(key = %key, ttl_secs = self.ttl.as_secs(), "Created hits-since-last-write counter");
                    return Ok(());
                }
                self.metrics.record_cache_race(key);
                match self.cache.get(key).await? {
                    Some(value) => tally_from_value(key, &value)?,
                    None => {
                        return Err(MostReadError::CacheUnavailable(format!(
                            "{key} absent after losing the create race"
                        )))
                    }
                }
            }
        };
        self.cache
            .set(key, Value::from(current.saturating_add(amount)), self.ttl)
            .await
    }
}
