//! Unverified JWT claim decoding.
//!
//! The storefront never holds the signing secret: tokens are minted and
//! verified by the backend. The edge and the client only peek at the `exp`
//! claim to decide whether a token is worth presenting at all.

use jsonwebtoken::dangerous::insecure_decode;
use jsonwebtoken::errors::Error;
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// The subset of claims the storefront cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    /// Expiration time (Unix timestamp)
    #[serde(default)]
    pub exp: Option<u64>,
    /// Subject, when the backend sets one
    #[serde(default)]
    pub sub: Option<String>,
}

impl TokenClaims {
    /// Whether the expiry claim lies strictly in the past.
    /// Tokens without an `exp` claim never expire from our point of view.
    pub fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.exp, Some(exp) if exp < now)
    }
}

/// Decode the claims of a JWT without checking its signature or expiry.
pub fn decode_claims(token: &str) -> Result<TokenClaims, Error> {
    insecure_decode::<TokenClaims>(token).map(|data| data.claims)
}

/// Current Unix time in seconds.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
