//! The shared cache seam.
//!
//! Every request handler in a deployment sees the same shared cache. The
//! counter batch, the hit tally and the rendered listing all live there, and
//! the only coordination between handlers is what this interface offers:
//! single-key reads and writes plus an atomic create-if-absent.
//!
//! Values are `serde_json::Value` so that a networked backend can store
//! them as serialized blobs, and so that readers can detect entries that do
//! not have the shape they expect.

pub mod memory;

use crate::error::MostReadResult;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub use memory::{CacheStats, MemorySharedCache};

/// Key-value store shared by every request handler.
///
/// A `ttl` of zero means the entry never expires.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Read an entry. Expired entries read as `None`.
    async fn get(&self, key: &str) -> MostReadResult<Option<Value>>;

    /// Create an entry only if the key is absent. Returns `false` when
    /// another writer got there first.
    async fn add(&self, key: &str, value: Value, ttl: Duration) -> MostReadResult<bool>;

    /// Unconditionally overwrite an entry.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> MostReadResult<()>;
}
