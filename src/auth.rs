//! Tokens that hit-reporting clients echo back with every hit.
//!
//! A token is an HMAC-SHA256 over an action name and a time tick. A tick
//! lasts half the configured lifetime and the current or previous tick is
//! accepted, so a token stays valid for between half and the full lifetime.

use crate::config::AuthConfig;
use crate::error::{MostReadError, MostReadResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Action name mixed into every token.
pub const HIT_ACTION: &str = "most_read_hit";

/// Decides whether an ingress token is acceptable.
pub trait HitAuthenticator: Send + Sync {
    fn verify(&self, token: &str) -> bool;
}

/// Accepts every token. Used when no secret is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl HitAuthenticator for AcceptAll {
    fn verify(&self, _token: &str) -> bool {
        true
    }
}

/// Issues and verifies time-limited HMAC tokens.
#[derive(Clone)]
pub struct HitTokenIssuer {
    secret: Vec<u8>,
    tick_secs: u64,
}

impl std::fmt::Debug for HitTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HitTokenIssuer")
            .field("tick_secs", &self.tick_secs)
            .finish_non_exhaustive()
    }
}

impl HitTokenIssuer {
    pub fn new(secret: impl Into<Vec<u8>>, lifetime_secs: u64) -> MostReadResult<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(MostReadError::InvalidArgument(
                "hit token secret cannot be empty".into(),
            ));
        }
        if lifetime_secs < 2 {
            return Err(MostReadError::InvalidArgument(format!(
                "hit token lifetime of {lifetime_secs}s is too short"
            )));
        }
        Ok(Self {
            secret,
            tick_secs: lifetime_secs / 2,
        })
    }

    /// Token for the current time.
    pub fn issue(&self) -> String {
        self.issue_at(now_secs())
    }

    pub fn issue_at(&self, unix_secs: u64) -> String {
        hex::encode(self.mac_for(self.tick(unix_secs)).finalize().into_bytes())
    }

    pub fn verify_at(&self, token: &str, unix_secs: u64) -> bool {
        let Ok(presented) = hex::decode(token) else {
            return false;
        };
        let tick = self.tick(unix_secs);
        [Some(tick), tick.checked_sub(1)]
            .into_iter()
            .flatten()
            .any(|t| self.mac_for(t).verify_slice(&presented).is_ok())
    }

    fn tick(&self, unix_secs: u64) -> u64 {
        unix_secs / self.tick_secs
    }

    fn mac_for(&self, tick: u64) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(HIT_ACTION.as_bytes());
        mac.update(b"|");
        mac.update(&tick.to_be_bytes());
        mac
    }
}

impl HitAuthenticator for HitTokenIssuer {
    fn verify(&self, token: &str) -> bool {
        self.verify_at(token, now_secs())
    }
}

/// Build the authenticator the configuration asks for.
pub fn authenticator_from_config(auth: &AuthConfig) -> MostReadResult<Arc<dyn HitAuthenticator>> {
    match auth.secret.as_deref() {
        Some(secret) => Ok(Arc::new(HitTokenIssuer::new(
            secret.as_bytes(),
            auth.nonce_lifetime_secs,
        )?)),
        None => Ok(Arc::new(AcceptAll)),
    }
}

fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}
