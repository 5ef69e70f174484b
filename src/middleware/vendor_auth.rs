use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};

use crate::cache::POSITIVE_LOOKUP_TTL_SECS;
use crate::crypto::hashing;
use crate::crypto::tokens::{classify, CredentialKind};
use crate::errors::AppError;
use crate::middleware::usage;
use crate::models::audit::{ActorType, AuditEvent, ReasonCode};
use crate::models::usage::UsageRecord;
use crate::models::vendor::{TenantContext, VendorApiKey, VendorOrganization};
use crate::AppState;

/// Explicit client-classification header. Platform restrictions are checked
/// against this declared value, never against User-Agent.
pub const PLATFORM_HEADER: &str = "x-client-platform";

const AUTHORIZE_ACTION: &str = "vendor.authorize";

/// Cached pairing of a key row and its owning organization. Bounded by
/// [`POSITIVE_LOOKUP_TTL_SECS`] so revocation still lands within seconds.
#[derive(Serialize, Deserialize)]
struct KeyWithOrg {
    key: VendorApiKey,
    org: VendorOrganization,
}

/// Tenant-scoped authorization middleware. Applied to every vendor API
/// route; on success the request carries a [`TenantContext`] extension and
/// the response carries rate-limit headers. Usage accounting is emitted
/// after the response is produced and never blocks or fails the request.
pub async fn vendor_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(req.headers());
    let audit = &state.audit;

    let credential = match bearer_token(req.headers()) {
        Some(c) => c.to_string(),
        None => {
            audit.record(
                AuditEvent::failure(ActorType::Vendor, "-", AUTHORIZE_ACTION, ReasonCode::MalformedKey)
                    .with_ip(ip),
            );
            return Err(AppError::InvalidRequest(
                "missing bearer credential".into(),
            ));
        }
    };

    // Dispatch on shape before any validation. A session token or OAuth
    // token presented here is rejected outright, never cross-validated.
    if classify(&credential) != CredentialKind::VendorKey {
        audit.record(
            AuditEvent::failure(ActorType::Vendor, "-", AUTHORIZE_ACTION, ReasonCode::WrongTokenShape)
                .with_ip(ip),
        );
        return Err(AppError::InvalidClient);
    }

    let Some((key_id, key_secret)) = credential.split_once('.') else {
        audit.record(
            AuditEvent::failure(ActorType::Vendor, "-", AUTHORIZE_ACTION, ReasonCode::MalformedKey)
                .with_ip(ip),
        );
        return Err(AppError::InvalidRequest("malformed vendor key".into()));
    };

    let KeyWithOrg { key, org } = match load_key_with_org(&state, key_id).await? {
        Some(pair) => pair,
        None => {
            audit.record(
                AuditEvent::failure(ActorType::Vendor, key_id, AUTHORIZE_ACTION, ReasonCode::UnknownKey)
                    .with_ip(ip),
            );
            return Err(AppError::InvalidClient);
        }
    };

    if key.is_revoked() {
        audit.record(
            AuditEvent::failure(ActorType::Vendor, key_id, AUTHORIZE_ACTION, ReasonCode::RevokedKey)
                .with_ip(ip),
        );
        return Err(AppError::InvalidClient);
    }

    // Argon2 verification is deliberately slow; keep it off the runtime
    // worker threads.
    let secret = key_secret.to_string();
    let stored_hash = key.key_secret_hash.clone();
    let verified =
        tokio::task::spawn_blocking(move || hashing::verify_vendor_secret(&secret, &stored_hash))
            .await
            .map_err(|e| anyhow::anyhow!("hash verification task failed: {e}"))?;

    if !verified {
        audit.record(
            AuditEvent::failure(ActorType::Vendor, key_id, AUTHORIZE_ACTION, ReasonCode::BadKeySecret)
                .with_ip(ip),
        );
        return Err(AppError::InvalidClient);
    }

    let platform = req
        .headers()
        .get(PLATFORM_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("api")
        .to_string();

    if !org.platform_allowed(&platform) {
        audit.record(
            AuditEvent::failure(ActorType::Vendor, key_id, AUTHORIZE_ACTION, ReasonCode::PlatformDenied)
                .with_ip(ip),
        );
        return Err(AppError::AccessDenied);
    }

    let service = service_from_path(req.uri().path());
    if !org.service_allowed(&service) {
        audit.record(
            AuditEvent::failure(ActorType::Vendor, key_id, AUTHORIZE_ACTION, ReasonCode::ServiceDenied)
                .with_ip(ip),
        );
        return Err(AppError::AccessDenied);
    }

    let limit = org.rate_limit_per_minute.max(0) as u32;
    let rate = state.limiter.check(org.id, limit).await?;
    if !rate.allowed {
        audit.record(
            AuditEvent::failure(ActorType::Vendor, key_id, AUTHORIZE_ACTION, ReasonCode::RateLimited)
                .with_ip(ip),
        );
        let retry_after_secs = (rate.reset_at - chrono::Utc::now()).num_seconds().max(1) as u64;
        return Err(AppError::RateLimitExceeded { retry_after_secs });
    }

    let tenant = TenantContext {
        org_id: org.id,
        vendor_code: org.vendor_code.clone(),
        key_id: key.key_id.clone(),
        key_type: key.key_type.clone(),
        environment: key.environment.clone(),
    };
    req.extensions_mut().insert(tenant);

    audit.record(
        AuditEvent::success(ActorType::Vendor, key.key_id.clone(), AUTHORIZE_ACTION).with_ip(ip),
    );

    let started = Instant::now();
    let mut response = next.run(req).await;

    let latency_ms = started.elapsed().as_millis().min(i32::MAX as u128) as i32;
    let record = UsageRecord::new(org.id, &key.key_id, &service, latency_ms)
        .with_cost(usage::estimated_cost(latency_ms));
    usage::record_async(state.db.pool().clone(), state.alerts.clone(), record);

    let headers = response.headers_mut();
    if let Ok(v) = axum::http::HeaderValue::from_str(&rate.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", v);
    }
    if let Ok(v) = axum::http::HeaderValue::from_str(&rate.reset_at.timestamp().to_string()) {
        headers.insert("x-ratelimit-reset", v);
    }

    Ok(response)
}

async fn load_key_with_org(
    state: &AppState,
    key_id: &str,
) -> Result<Option<KeyWithOrg>, AppError> {
    let cache_key = format!("vkey:{key_id}");
    if let Some(pair) = state.cache.get::<KeyWithOrg>(&cache_key).await {
        return Ok(Some(pair));
    }

    let Some(key) = state.db.get_vendor_key(key_id).await? else {
        return Ok(None);
    };
    let Some(org) = state.db.get_org(key.org_id).await? else {
        // A key without its organization is a data defect, not a caller error.
        tracing::error!(key_id, org_id = %key.org_id, "vendor key references missing organization");
        return Ok(None);
    };

    let pair = KeyWithOrg { key, org };
    if let Err(e) = state
        .cache
        .set(&cache_key, &pair, POSITIVE_LOOKUP_TTL_SECS)
        .await
    {
        tracing::warn!("failed to cache vendor key lookup: {}", e);
    }
    Ok(Some(pair))
}

/// Target service named by the route: the first path segment after the
/// version prefix (`/v1/search/query` → `search`).
fn service_from_path(path: &str) -> String {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match segments.next() {
        Some("v1") => segments.next().unwrap_or("").to_string(),
        Some(first) => first.to_string(),
        None => String::new(),
    }
}

/// Bearer credential from the Authorization header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Originating client address, taken from the proxy-forwarded header.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn service_derivation_skips_version_prefix() {
        assert_eq!(service_from_path("/v1/search/query"), "search");
        assert_eq!(service_from_path("/v1/tenant/whoami"), "tenant");
        assert_eq!(service_from_path("/completions"), "completions");
        assert_eq!(service_from_path("/"), "");
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer vk_live_abc.secret"));
        assert_eq!(bearer_token(&headers), Some("vk_live_abc.secret"));

        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn forwarded_ip_takes_first_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.2"),
        );
        assert_eq!(client_ip(&headers), Some("203.0.113.9".to_string()));
    }
}
