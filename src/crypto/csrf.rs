//! Double-submit CSRF guard for browser-initiated authorization attempts.
//!
//! A token is issued when a web-platform session is established and re-issued
//! after each authorization attempt. Only the token's digest is stored, in
//! Redis, keyed by the issuing session; presenting the token consumes the
//! stored copy atomically, so a second use or an expired token fails closed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use uuid::Uuid;

use crate::cache::TieredCache;
use crate::crypto::hashing;

/// Cookie carrying the browser half of the double-submit pair.
pub const CSRF_COOKIE: &str = "authgate_csrf";

const CSRF_TTL_SECS: u64 = 15 * 60;

#[derive(Clone)]
pub struct CsrfGuard {
    cache: TieredCache,
}

impl CsrfGuard {
    pub fn new(cache: TieredCache) -> Self {
        Self { cache }
    }

    /// Mint a one-time token bound to `session_id` and store its digest.
    /// The plaintext goes back to the browser (cookie + response body); the
    /// store never sees it.
    pub async fn issue(&self, session_id: Uuid) -> anyhow::Result<String> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        self.cache
            .put_one_time(
                &Self::key(session_id),
                &hashing::digest_token(&token),
                CSRF_TTL_SECS,
            )
            .await?;
        Ok(token)
    }

    /// Consume the token stored for `session_id` and compare it against the
    /// presented value. Exactly one call can succeed per issued token;
    /// expired, missing, or mismatched tokens all read as `false`.
    ///
    /// A mismatch still consumes the stored digest: a wrong guess burns the
    /// token rather than leaving it open for retries.
    pub async fn consume(&self, session_id: Uuid, presented: &str) -> anyhow::Result<bool> {
        let stored = self.cache.take_one_time(&Self::key(session_id)).await?;
        match stored {
            Some(digest) => Ok(hashing::digests_match(
                &digest,
                &hashing::digest_token(presented),
            )),
            None => Ok(false),
        }
    }

    fn key(session_id: Uuid) -> String {
        format!("csrf:{session_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_scoped_per_session() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_ne!(CsrfGuard::key(a), CsrfGuard::key(b));
        assert!(CsrfGuard::key(a).starts_with("csrf:"));
    }
}
