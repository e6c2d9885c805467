use crate::error::{MostReadError, MostReadResult};
use crate::types::ItemId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU64;

/// Opaque claim a flusher writes into the batch. Never zero, so "no token"
/// and "a token" cannot be confused on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlushToken(NonZeroU64);

impl FlushToken {
    /// A fresh random token, distinct per call with overwhelming probability.
    pub fn generate() -> Self {
        loop {
            if let Some(value) = NonZeroU64::new(rand::random()) {
                return Self(value);
            }
        }
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl From<NonZeroU64> for FlushToken {
    fn from(value: NonZeroU64) -> Self {
        Self(value)
    }
}

impl fmt::Display for FlushToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0.get())
    }
}

/// `flushing` is `false` when idle and the token while a flush runs.
mod flushing_field {
    use super::FlushToken;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::num::NonZeroU64;

    pub fn serialize<S: Serializer>(token: &Option<FlushToken>, s: S) -> Result<S::Ok, S::Error> {
        match token {
            Some(token) => s.serialize_u64(token.get()),
            None => s.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<FlushToken>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Token(u64),
        }

        match Raw::deserialize(d)? {
            Raw::Flag(false) => Ok(None),
            Raw::Flag(true) => Err(D::Error::custom("flushing must be false or a token")),
            Raw::Token(value) => NonZeroU64::new(value)
                .map(|v| Some(FlushToken::from(v)))
                .ok_or_else(|| D::Error::custom("flush token must be non-zero")),
        }
    }
}

/// Pending per-item increments plus the flush claim, stored as one cache
/// entry: `{"flushing": false | <token>, "counts": {"<item>": <n>, ...}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CounterBatch {
    #[serde(default, with = "flushing_field")]
    pub flushing: Option<FlushToken>,
    #[serde(default)]
    counts: BTreeMap<ItemId, u64>,
}

impl CounterBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh batch holding a single item's increment.
    pub fn with_hit(item_id: ItemId, amount: u64) -> Self {
        let mut batch = Self::new();
        batch.add(item_id, amount);
        batch
    }

    pub fn add(&mut self, item_id: ItemId, amount: u64) {
        let count = self.counts.entry(item_id).or_insert(0);
        *count = count.saturating_add(amount);
    }

    pub fn count(&self, item_id: ItemId) -> u64 {
        self.counts.get(&item_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().fold(0u64, |acc, n| acc.saturating_add(*n))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn counts(&self) -> impl Iterator<Item = (ItemId, u64)> + '_ {
        self.counts.iter().map(|(id, n)| (*id, *n))
    }

    /// Drop the token and hand over the counts, ordered by item.
    pub fn into_counts(self) -> Vec<(ItemId, u64)> {
        self.counts.into_iter().collect()
    }

    pub fn to_value(&self) -> MostReadResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode the entry stored at `key`, reporting any other shape as
    /// malformed state.
    pub fn from_value(key: &str, value: &Value) -> MostReadResult<Self> {
        if !value.is_object() {
            return Err(MostReadError::malformed(
                key,
                format!("expected an object, found {}", value_kind(value)),
            ));
        }
        Self::deserialize(value).map_err(|e| MostReadError::malformed(key, e.to_string()))
    }
}

/// Decode the hits-since-last-write tally stored at `key`.
pub fn tally_from_value(key: &str, value: &Value) -> MostReadResult<u64> {
    value.as_u64().ok_or_else(|| {
        MostReadError::malformed(
            key,
            format!("expected a non-negative integer, found {}", value_kind(value)),
        )
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
