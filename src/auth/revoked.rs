use moka::Expiry;
use moka::future::Cache;
use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

use crate::auth::jwt;

/// Slack past `exp` so clock skew cannot reopen a revoked token.
const EXPIRY_GRACE_SECS: u64 = 60;

/// Keeps a revoked id exactly as long as the token itself could still verify.
struct UntilTokenExpires;

impl Expiry<String, usize> for UntilTokenExpires {
    fn expire_after_create(&self, _jti: &String, exp: &usize, _created_at: Instant) -> Option<Duration> {
        let remaining = exp.saturating_sub(jwt::now()) as u64;
        Some(Duration::from_secs(remaining + EXPIRY_GRACE_SECS))
    }
}

/// Refresh-token ids that were rotated or logged out, with their `exp`.
/// No capacity bound: an id may only leave once its token has expired.
pub static REVOKED_REFRESH: Lazy<Cache<String, usize>> =
    Lazy::new(|| Cache::builder().expire_after(UntilTokenExpires).build());

pub async fn revoke(jti: &str, exp: usize) {
    REVOKED_REFRESH.insert(jti.to_string(), exp).await;
}

pub async fn is_revoked(jti: &str) -> bool {
    REVOKED_REFRESH.contains_key(jti)
}
