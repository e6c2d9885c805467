//! Outcome values for operations that never fail outward.
//!
//! Recording a hit, flushing, and handling an ingress request all degrade
//! silently for their callers. These enums keep what actually happened
//! observable for logs and tests.

use chrono::NaiveDate;
use strum::{Display, IntoStaticStr};

use super::ItemId;
use crate::error::MostReadError;

/// Why a hit never reached the counter batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum DropReason {
    CacheUnavailable,
    MalformedState,
}

impl From<&MostReadError> for DropReason {
    fn from(err: &MostReadError) -> Self {
        match err {
            MostReadError::MalformedState { .. } => DropReason::MalformedState,
            _ => DropReason::CacheUnavailable,
        }
    }
}

/// What `record_hit` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The hit is in the batch. `flush` is set when this call crossed the
    /// threshold and ran the flusher.
    Recorded { flush: Option<FlushOutcome> },
    Dropped(DropReason),
}

impl RecordOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded { .. })
    }

    pub fn flush(&self) -> Option<&FlushOutcome> {
        match self {
            RecordOutcome::Recorded { flush } => flush.as_ref(),
            RecordOutcome::Dropped(_) => None,
        }
    }
}

/// Why a flush stopped before reaching the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum AbortReason {
    /// No counter batch in the cache.
    Missing,
    /// The batch is not a well-formed batch.
    Malformed,
    /// The batch already carries another flusher's token.
    AlreadyFlushing,
    /// Another flusher overwrote this one's token during the grace period.
    LostRace,
    /// A cache read or write failed.
    CacheUnavailable,
}

/// What a flush did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The claimed batch was upserted for `date`.
    Persisted {
        date: NaiveDate,
        items: usize,
        hits: u64,
    },
    /// The upsert failed and the claimed counts went back into the batch.
    /// `lost` lists pairs that could not be written back.
    Reintegrated {
        items: usize,
        hits: u64,
        lost: Vec<(ItemId, u64)>,
    },
    /// Ownership was confirmed but the batch held no counts.
    NothingToFlush,
    Aborted(AbortReason),
}

impl FlushOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, FlushOutcome::Persisted { .. })
    }
}

/// Why an ingress request was ignored before authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum IgnoreReason {
    MissingFields,
    InvalidItemId,
}

/// What the hit ingress did with a request. The transport replies with an
/// empty body whatever this is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressOutcome {
    Recorded(RecordOutcome),
    Rejected,
    Ignored(IgnoreReason),
}
