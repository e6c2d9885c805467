//! Entry point for hit events arriving from the transport layer.
//!
//! Whatever happens here, the transport answers with an empty body. Bad
//! tokens in particular are dropped silently so a probing client cannot
//! tell a rejected hit from an accepted one.

use crate::auth::HitAuthenticator;
use crate::counter::HitCounter;
use crate::types::{IgnoreReason, IngressOutcome, ItemId};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Fields posted by the hit-reporting script.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HitRequest {
    #[serde(rename = "postID")]
    pub post_id: Option<String>,
    #[serde(rename = "_ajax_nonce")]
    pub nonce: Option<String>,
}

impl HitRequest {
    pub fn new(item_id: ItemId, nonce: impl Into<String>) -> Self {
        Self {
            post_id: Some(item_id.to_string()),
            nonce: Some(nonce.into()),
        }
    }
}

pub struct HitIngress {
    counter: Arc<HitCounter>,
    auth: Arc<dyn HitAuthenticator>,
}

impl HitIngress {
    pub fn new(counter: Arc<HitCounter>, auth: Arc<dyn HitAuthenticator>) -> Self {
        Self { counter, auth }
    }

    pub async fn handle(&self, request: HitRequest) -> IngressOutcome {
        let (Some(post_id), Some(nonce)) = (request.post_id, request.nonce) else {
            debug!("Hit request missing postID or nonce");
            return IngressOutcome::Ignored(IgnoreReason::MissingFields);
        };
        let Ok(item_id) = post_id.trim().parse::<ItemId>() else {
            debug!(post_id = %post_id, "Hit request with unparseable postID");
            return IngressOutcome::Ignored(IgnoreReason::InvalidItemId);
        };
        if !self.auth.verify(&nonce) {
            debug!(item_id, "Token check failed");
            return IngressOutcome::Rejected;
        }

        debug!(item_id, "Hit");
        IngressOutcome::Recorded(self.counter.record_hit(item_id).await)
    }
}
