use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A tenant organization owning vendor API keys.
///
/// `allowed_platforms` and `allowed_services` are opt-in restriction sets:
/// an empty set means "no restriction", a non-empty set means "only these".
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VendorOrganization {
    pub id: Uuid,
    pub vendor_code: String,
    pub allowed_platforms: Vec<String>,
    pub allowed_services: serde_json::Value,
    pub rate_limit_per_minute: i32,
    pub created_at: DateTime<Utc>,
}

impl VendorOrganization {
    pub fn platform_allowed(&self, platform: &str) -> bool {
        self.allowed_platforms.is_empty()
            || self.allowed_platforms.iter().any(|p| p == platform)
    }

    /// Service checks follow the same opt-in model, expressed as a
    /// service → bool map. An absent entry in a non-empty map is a denial.
    pub fn service_allowed(&self, service: &str) -> bool {
        match self.allowed_services.as_object() {
            None => true,
            Some(map) if map.is_empty() => true,
            Some(map) => map.get(service).and_then(|v| v.as_bool()).unwrap_or(false),
        }
    }
}

/// A long-lived `key_id.key_secret` credential scoped to one organization.
/// The secret is stored as an Argon2id PHC string, never reversibly.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VendorApiKey {
    pub id: Uuid,
    pub key_id: String,
    pub key_secret_hash: String,
    pub org_id: Uuid,
    pub key_type: String,
    pub environment: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl VendorApiKey {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Tenant scope attached to a request after successful key authorization.
/// Downstream handlers read this instead of re-resolving the key.
#[derive(Debug, Clone, Serialize)]
pub struct TenantContext {
    pub org_id: Uuid,
    pub vendor_code: String,
    pub key_id: String,
    pub key_type: String,
    pub environment: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn org(platforms: &[&str], services: serde_json::Value) -> VendorOrganization {
        VendorOrganization {
            id: Uuid::new_v4(),
            vendor_code: "acme".into(),
            allowed_platforms: platforms.iter().map(|s| s.to_string()).collect(),
            allowed_services: services,
            rate_limit_per_minute: 60,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_sets_allow_everything() {
        let o = org(&[], json!({}));
        assert!(o.platform_allowed("cli"));
        assert!(o.service_allowed("completions"));
    }

    #[test]
    fn non_empty_sets_are_opt_in() {
        let o = org(&["api"], json!({"completions": true, "embeddings": false}));

        assert!(o.platform_allowed("api"));
        assert!(!o.platform_allowed("cli"));

        assert!(o.service_allowed("completions"));
        assert!(!o.service_allowed("embeddings"));
        // Absent from a non-empty map: denied, not defaulted.
        assert!(!o.service_allowed("search"));
    }
}
