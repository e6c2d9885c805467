//! Core data types shared by the counter, the flusher and the ingress.

pub mod outcome;

pub use outcome::{AbortReason, DropReason, FlushOutcome, IgnoreReason, IngressOutcome, RecordOutcome};

/// Identifier of a content item (a post, an article, a page).
pub type ItemId = u64;
