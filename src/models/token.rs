use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A short-lived, single-use credential minted at `/oauth/authorize` and
/// exchanged for a token pair at `/oauth/token`. Only the SHA-256 digest of
/// the code is stored; `consumed_at` is set exactly once by a conditional
/// update so concurrent exchanges race safely.
#[derive(Debug, Clone, FromRow)]
pub struct AuthorizationCode {
    pub id: Uuid,
    pub code_hash: String,
    pub client_id: String,
    pub user_id: Uuid,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// An issued OAuth access or refresh token. Stored by digest only.
///
/// Refresh tokens rotate on every use: the replacement pair carries
/// `parent_token_id` pointing at the refresh token it was minted from,
/// forming a chain that is revoked as a unit on suspected theft.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthToken {
    pub id: Uuid,
    pub token_hash: String,
    pub token_type: String,
    pub user_id: Uuid,
    pub client_id: String,
    pub scope: String,
    pub parent_token_id: Option<Uuid>,
    pub auth_code_id: Option<Uuid>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "access" => Some(Self::Access),
            "refresh" => Some(Self::Refresh),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl OAuthToken {
    pub fn is_refresh(&self) -> bool {
        self.token_type == TokenType::Refresh.as_str()
    }

    /// A token is active when it is neither revoked nor past expiry.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Wire shape of a successful `/oauth/token` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(revoked: bool, ttl_secs: i64) -> OAuthToken {
        let now = Utc::now();
        OAuthToken {
            id: Uuid::new_v4(),
            token_hash: "h".into(),
            token_type: "access".into(),
            user_id: Uuid::new_v4(),
            client_id: "web-app".into(),
            scope: "read".into(),
            parent_token_id: None,
            auth_code_id: None,
            issued_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
            revoked_at: revoked.then_some(now),
        }
    }

    #[test]
    fn active_requires_unrevoked_and_unexpired() {
        let now = Utc::now();
        assert!(token(false, 60).is_active(now));
        assert!(!token(true, 60).is_active(now));
        assert!(!token(false, -60).is_active(now));
    }
}
