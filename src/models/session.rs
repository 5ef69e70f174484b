use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A legacy stateless-scheme session. One row per issued token.
///
/// The token itself is a signed JWT, but the row is the trust anchor:
/// validation always resolves the presented token by digest so revocation
/// takes effect immediately, independent of the token's own expiry claim.
#[derive(Debug, Clone, FromRow)]
pub struct LegacySession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub platform: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl LegacySession {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Client populations the legacy scheme serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Cli,
    Web,
    Api,
    Mcp,
}

impl Platform {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cli" => Some(Self::Cli),
            "web" => Some(Self::Web),
            "api" => Some(Self::Api),
            "mcp" => Some(Self::Mcp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Web => "web",
            Self::Api => "api",
            Self::Mcp => "mcp",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_roundtrip() {
        for p in ["cli", "web", "api", "mcp"] {
            assert_eq!(Platform::parse(p).unwrap().as_str(), p);
        }
        assert!(Platform::parse("browser").is_none());
    }
}
