use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::hashing;
use crate::models::client::{ClientType, OAuthClient};
use crate::models::vendor::VendorOrganization;
use crate::store::postgres::{
    AuditLogRow, NewOAuthClient, NewVendorApiKey, NewVendorOrganization,
};
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterClientRequest {
    pub client_id: String,
    pub client_type: String,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub requires_pkce: Option<bool>,
}

#[derive(Serialize)]
pub struct RegisterClientResponse {
    pub id: Uuid,
    pub client_id: String,
    pub requires_pkce: bool,
}

#[derive(Deserialize)]
pub struct RedirectUrisRequest {
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
pub struct CreateOrgRequest {
    pub vendor_code: String,
    pub allowed_platforms: Option<Vec<String>>,
    pub allowed_services: Option<serde_json::Value>,
    pub rate_limit_per_minute: Option<i32>,
}

#[derive(Serialize)]
pub struct CreateOrgResponse {
    pub id: Uuid,
    pub vendor_code: String,
}

#[derive(Deserialize)]
pub struct IssueKeyRequest {
    pub key_type: String,
    pub environment: Option<String>,
}

/// The secret appears here once, at issuance. Only its hash survives.
#[derive(Serialize)]
pub struct IssueKeyResponse {
    pub key_id: String,
    pub key_secret: String,
    pub bearer: String,
}

#[derive(Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ── OAuth client management ──────────────────────────────────

/// POST /admin/v1/clients — register an OAuth client.
/// Public clients cannot opt out of PKCE regardless of what the request says.
pub async fn register_client(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterClientRequest>,
) -> Result<(StatusCode, Json<RegisterClientResponse>), StatusCode> {
    let Some(client_type) = ClientType::parse(&req.client_type) else {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    };
    if req.client_id.is_empty() || req.redirect_uris.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let requires_pkce = match client_type {
        ClientType::Public => true,
        ClientType::Confidential => req.requires_pkce.unwrap_or(true),
    };

    let new_client = NewOAuthClient {
        client_id: req.client_id.clone(),
        client_type: client_type.as_str().to_string(),
        redirect_uris: req.redirect_uris,
        allowed_scopes: req.allowed_scopes,
        requires_pkce,
    };

    let id = state.db.insert_client(&new_client).await.map_err(|e| {
        tracing::error!("register_client failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterClientResponse {
            id,
            client_id: req.client_id,
            requires_pkce,
        }),
    ))
}

/// GET /admin/v1/clients
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OAuthClient>>, StatusCode> {
    let clients = state.db.list_clients().await.map_err(|e| {
        tracing::error!("list_clients failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(clients))
}

/// POST /admin/v1/clients/:client_id/disable — soft-disable; tokens that
/// reference the client keep their rows, new grants stop immediately.
pub async fn disable_client(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let disabled = state.db.disable_client(&client_id).await.map_err(|e| {
        tracing::error!("disable_client failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    if disabled {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// PUT /admin/v1/clients/:client_id/redirect-uris — the one runtime-mutable
/// client field.
pub async fn update_redirect_uris(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Json(req): Json<RedirectUrisRequest>,
) -> Result<StatusCode, StatusCode> {
    if req.redirect_uris.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let updated = state
        .db
        .update_redirect_uris(&client_id, &req.redirect_uris)
        .await
        .map_err(|e| {
            tracing::error!("update_redirect_uris failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

// ── Vendor tenancy management ────────────────────────────────

/// POST /admin/v1/vendors — create a tenant organization.
pub async fn create_org(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrgRequest>,
) -> Result<(StatusCode, Json<CreateOrgResponse>), StatusCode> {
    if req.vendor_code.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let new_org = NewVendorOrganization {
        vendor_code: req.vendor_code.clone(),
        allowed_platforms: req.allowed_platforms.unwrap_or_default(),
        allowed_services: req.allowed_services.unwrap_or_else(|| serde_json::json!({})),
        rate_limit_per_minute: req
            .rate_limit_per_minute
            .unwrap_or(state.config.default_rate_limit_per_minute as i32),
    };

    let id = state.db.insert_org(&new_org).await.map_err(|e| {
        tracing::error!("create_org failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrgResponse {
            id,
            vendor_code: req.vendor_code,
        }),
    ))
}

/// GET /admin/v1/vendors
pub async fn list_orgs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VendorOrganization>>, StatusCode> {
    let orgs = state.db.list_orgs().await.map_err(|e| {
        tracing::error!("list_orgs failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(orgs))
}

/// POST /admin/v1/vendors/:org_id/keys — issue a key. The plaintext secret
/// is in this response and nowhere else, ever.
pub async fn issue_key(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    Json(req): Json<IssueKeyRequest>,
) -> Result<(StatusCode, Json<IssueKeyResponse>), StatusCode> {
    if !matches!(req.key_type.as_str(), "live" | "test") {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    if state
        .db
        .get_org(org_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .is_none()
    {
        return Err(StatusCode::NOT_FOUND);
    }

    let material = state.issuer.new_vendor_key(&req.key_type);
    let secret_hash = hashing::hash_vendor_secret(&material.key_secret).map_err(|e| {
        tracing::error!("vendor secret hashing failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    state
        .db
        .insert_vendor_key(&NewVendorApiKey {
            key_id: material.key_id.clone(),
            key_secret_hash: secret_hash,
            org_id,
            key_type: req.key_type,
            environment: req.environment.unwrap_or_else(|| "production".into()),
        })
        .await
        .map_err(|e| {
            tracing::error!("issue_key failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok((
        StatusCode::CREATED,
        Json(IssueKeyResponse {
            bearer: material.bearer_value(),
            key_id: material.key_id,
            key_secret: material.key_secret,
        }),
    ))
}

/// POST /admin/v1/keys/:key_id/revoke
pub async fn revoke_key(
    State(state): State<Arc<AppState>>,
    Path(key_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let revoked = state.db.revoke_vendor_key(&key_id).await.map_err(|e| {
        tracing::error!("revoke_key failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    // Revoking an already-revoked key is a no-op, not an error.
    if revoked {
        state.cache.invalidate_local(&format!("vkey:{key_id}"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ── Audit trail ──────────────────────────────────────────────

/// GET /admin/v1/audit — recent authorization decisions, newest first.
pub async fn list_audit_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<AuditLogRow>>, StatusCode> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let offset = params.offset.unwrap_or(0).max(0);
    let rows = state.db.list_audit_events(limit, offset).await.map_err(|e| {
        tracing::error!("list_audit_events failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(rows))
}
