use super::batch::{CounterBatch, FlushToken};
use super::HitCounter;
use crate::error::MostReadError;
use crate::types::{AbortReason, FlushOutcome};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn, Instrument};

impl HitCounter {
    /// Run `flush` on its own task and wait for it.
    ///
    /// Between the claim and the reset the batch carries our token, and every
    /// hit writes that token back. If the caller's future were dropped in
    /// that window the token would never be cleared and no later flush could
    /// run. A spawned task finishes the protocol even when its caller is gone.
    pub(super) async fn flush_detached(&self) -> FlushOutcome {
        let counter = self.clone();
        let task = tokio::spawn(async move { counter.flush().await }.in_current_span());
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(key = %self.keys.counters, error = %e, "Flush task did not complete");
                self.abort(AbortReason::CacheUnavailable)
            }
        }
    }

    /// Drain the shared batch into the store.
    ///
    /// Reached from the threshold check in `record_hit_with`, through
    /// `flush_detached`.
    #[instrument(skip(self), fields(counter_op = "flush"))]
    pub(super) async fn flush(&self) -> FlushOutcome {
        let started = Instant::now();
        self.metrics.record_flush_attempt();
        let key = &self.keys.counters;

        let mut batch = match self.pending_batch().await {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                warn!(key = %key, "No cached counters to flush");
                return self.abort(AbortReason::Missing);
            }
            Err(e) => return self.abort_on_error(e),
        };
        if let Some(active) = batch.flushing {
            debug!(key = %key, active_token = %active, "Another instance is already flushing");
            return self.abort(AbortReason::AlreadyFlushing);
        }

        let token = FlushToken::generate();
        batch.flushing = Some(token);
        if let Err(e) = self.write_batch(&batch).await {
            return self.abort_on_error(e);
        }

        // Anyone who read the batch before our claim landed gets this long
        // to overwrite it with theirs.
        tokio::time::sleep(self.grace_period).await;

        let claimed = match self.pending_batch().await {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                warn!(key = %key, expected_token = %token, "Cached counters vanished during the grace period");
                return self.abort(AbortReason::LostRace);
            }
            Err(e) => return self.abort_on_error(e),
        };
        if claimed.flushing != Some(token) {
            info!(
                key = %key,
                expected_token = %token,
                actual_token = ?claimed.flushing.map(|t| t.to_string()),
                "Another instance claimed the flush"
            );
            return self.abort(AbortReason::LostRace);
        }

        if let Err(e) = self.write_batch(&CounterBatch::new()).await {
            error!(key = %key, token = %token, error = %e, "Could not reset cached counters");
            return self.abort(AbortReason::CacheUnavailable);
        }
        if let Err(e) = self
            .cache
            .set(&self.keys.hits_since_write, Value::from(0u64), self.ttl)
            .await
        {
            warn!(key = %self.keys.hits_since_write, error = %e, "Could not reset hit tally");
        }

        let counts = claimed.into_counts();
        if counts.is_empty() {
            warn!(key = %key, "Cached counters were empty when flushed");
            return FlushOutcome::NothingToFlush;
        }
        let items = counts.len();
        let hits = counts.iter().map(|(_, n)| *n).sum::<u64>();
        let date = self.clock.today();

        match self.store.upsert_hits(date, &counts).await {
            Ok(()) => {
                let latency = started.elapsed();
                self.metrics.record_flush_persisted(hits, latency);
                info!(
                    %date,
                    items,
                    hits,
                    latency_ms = latency.as_millis() as u64,
                    "Flushed cached counters"
                );
                FlushOutcome::Persisted { date, items, hits }
            }
            Err(e) => {
                error!(
                    %date,
                    items,
                    hits,
                    transient = e.is_transient(),
                    error = %e,
                    "Upsert failed, writing counts back to the cache"
                );
                self.metrics.record_upsert_failure(hits);
                let mut lost = Vec::new();
                for &(item_id, count) in &counts {
                    if self.increment(item_id, count, true).await.is_err() {
                        lost.push((item_id, count));
                    }
                }
                if !lost.is_empty() {
                    error!(lost_items = lost.len(), "Counts lost after a failed upsert");
                }
                FlushOutcome::Reintegrated { items, hits, lost }
            }
        }
    }

    async fn write_batch(&self, batch: &CounterBatch) -> Result<(), MostReadError> {
        self.cache
            .set(&self.keys.counters, batch.to_value()?, self.ttl)
            .await
    }

    fn abort(&self, reason: AbortReason) -> FlushOutcome {
        self.metrics.record_flush_aborted(reason.into());
        FlushOutcome::Aborted(reason)
    }

    fn abort_on_error(&self, e: MostReadError) -> FlushOutcome {
        let reason = match e {
            MostReadError::MalformedState { .. } => {
                self.metrics.record_malformed(&self.keys.counters);
                AbortReason::Malformed
            }
            _ => AbortReason::CacheUnavailable,
        };
        warn!(key = %self.keys.counters, error = %e, "The hit counters in the cache are not set properly");
        self.abort(reason)
    }
}
