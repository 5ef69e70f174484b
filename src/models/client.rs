use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A registered OAuth2 client application.
///
/// Clients are created through administrative registration and are
/// soft-disabled (never deleted) while tokens still reference them.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OAuthClient {
    pub id: Uuid,
    pub client_id: String,
    pub client_type: String,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub requires_pkce: bool,
    pub disabled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    Public,
    Confidential,
}

impl ClientType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "confidential" => Some(Self::Confidential),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Confidential => "confidential",
        }
    }
}

impl OAuthClient {
    pub fn is_enabled(&self) -> bool {
        self.disabled_at.is_none()
    }

    /// Exact-match check against the registered redirect URI set.
    /// Byte-for-byte equality only; no prefix, substring, or
    /// normalized comparison.
    pub fn redirect_allowed(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }

    /// A requested scope is valid when every space-separated entry is a
    /// member of the client's allowed set. An empty request is valid.
    pub fn scope_allowed(&self, scope: &str) -> bool {
        scope
            .split_whitespace()
            .all(|s| self.allowed_scopes.iter().any(|a| a == s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(redirects: &[&str]) -> OAuthClient {
        OAuthClient {
            id: Uuid::new_v4(),
            client_id: "web-app".into(),
            client_type: "public".into(),
            redirect_uris: redirects.iter().map(|s| s.to_string()).collect(),
            allowed_scopes: vec!["read".into(), "write".into()],
            requires_pkce: true,
            disabled_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn redirect_match_is_exact() {
        let c = client(&["https://app.example.com/cb"]);

        assert!(c.redirect_allowed("https://app.example.com/cb"));
        // Trailing slash, query string, and prefix variants must all fail.
        assert!(!c.redirect_allowed("https://app.example.com/cb/"));
        assert!(!c.redirect_allowed("https://app.example.com/cb?x=1"));
        assert!(!c.redirect_allowed("https://app.example.com/"));
        assert!(!c.redirect_allowed("https://app.example.com/cb2"));
    }

    #[test]
    fn scope_subset_check() {
        let c = client(&["https://app.example.com/cb"]);

        assert!(c.scope_allowed("read"));
        assert!(c.scope_allowed("read write"));
        assert!(c.scope_allowed(""));
        assert!(!c.scope_allowed("admin"));
        assert!(!c.scope_allowed("read admin"));
    }
}
