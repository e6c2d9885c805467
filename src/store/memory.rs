use super::{HitRecord, HitStore, ItemMeta, PopularItem};
use crate::error::MostReadResult;
use crate::types::ItemId;
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::trace;

/// In-process hit store.
///
/// Rows live in a `DashMap` keyed by `(item_id, date)`, so iteration order
/// is arbitrary. That is the "natural row order" ties in `top_items` fall
/// back to.
#[derive(Debug, Default)]
pub struct MemoryHitStore {
    rows: DashMap<(ItemId, NaiveDate), u64>,
    items: DashMap<ItemId, ItemMeta>,
}

impl MemoryHitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record display metadata for an item.
    pub fn register_item(
        &self,
        item_id: ItemId,
        title: impl Into<String>,
        permalink: impl Into<String>,
    ) {
        self.items.insert(
            item_id,
            ItemMeta {
                title: title.into(),
                permalink: permalink.into(),
            },
        );
    }

    /// Hits stored for one item on one date.
    pub fn hits_for(&self, item_id: ItemId, date: NaiveDate) -> u64 {
        self.rows.get(&(item_id, date)).map(|r| *r).unwrap_or(0)
    }

    /// Sum of every stored row.
    pub fn total_hits(&self) -> u64 {
        self.rows.iter().map(|r| *r.value()).sum()
    }

    /// Snapshot of all rows, sorted by item then date.
    pub fn records(&self) -> Vec<HitRecord> {
        let mut records: Vec<HitRecord> = self
            .rows
            .iter()
            .map(|r| HitRecord {
                item_id: r.key().0,
                date: r.key().1,
                hits: *r.value(),
            })
            .collect();
        records.sort_by_key(|r| (r.item_id, r.date));
        records
    }
}

#[async_trait]
impl HitStore for MemoryHitStore {
    async fn upsert_hits(&self, date: NaiveDate, counts: &[(ItemId, u64)]) -> MostReadResult<()> {
        for &(item_id, hits) in counts {
            let mut row = self.rows.entry((item_id, date)).or_insert(0);
            *row = row.saturating_add(hits);
        }
        trace!(rows = counts.len(), %date, "Upserted hit rows");
        Ok(())
    }

    async fn top_items(&self, after: NaiveDate, limit: usize) -> MostReadResult<Vec<PopularItem>> {
        let mut sums: HashMap<ItemId, u64> = HashMap::new();
        for row in self.rows.iter() {
            let (item_id, date) = *row.key();
            if date > after {
                *sums.entry(item_id).or_insert(0) += *row.value();
            }
        }

        let mut ranked: Vec<PopularItem> = sums
            .into_iter()
            .filter_map(|(item_id, hits)| {
                self.items.get(&item_id).map(|meta| PopularItem {
                    item_id,
                    title: meta.title.clone(),
                    permalink: meta.permalink.clone(),
                    hits,
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.hits.cmp(&a.hits));
        ranked.truncate(limit);
        Ok(ranked)
    }
}
