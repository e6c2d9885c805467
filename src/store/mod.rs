//! The persistent hit store seam.
//!
//! Durable per-item, per-day hit counts. A row is unique on
//! `(item_id, date)` and its count only ever grows: a flush adds its batch
//! to whatever the row already holds.

pub mod memory;

use crate::error::MostReadResult;
use crate::types::ItemId;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use memory::MemoryHitStore;

/// One persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitRecord {
    pub item_id: ItemId,
    pub date: NaiveDate,
    pub hits: u64,
}

/// Display data joined onto hit sums for the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    pub title: String,
    pub permalink: String,
}

/// An item with its summed hits over the listing window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularItem {
    pub item_id: ItemId,
    pub title: String,
    pub permalink: String,
    pub hits: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HitStore: Send + Sync {
    /// Add `hits` to the `(item, date)` row of every pair, inserting rows
    /// that do not exist. Runs as one statement: either every pair is
    /// applied or none is.
    async fn upsert_hits(&self, date: NaiveDate, counts: &[(ItemId, u64)]) -> MostReadResult<()>;

    /// The `limit` items with the most hits on dates strictly after `after`,
    /// joined against item metadata (items without metadata are skipped).
    /// Ordered by descending hit sum; the order among equal sums is
    /// unspecified.
    async fn top_items(&self, after: NaiveDate, limit: usize) -> MostReadResult<Vec<PopularItem>>;
}
