use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::csrf::CSRF_COOKIE;
use crate::crypto::hashing;
use crate::crypto::tokens::{classify, CredentialKind};
use crate::errors::AppError;
use crate::middleware::vendor_auth::{bearer_token, client_ip};
use crate::models::audit::{ActorType, AuditEvent, ReasonCode};
use crate::models::session::{LegacySession, Platform};
use crate::store::postgres::NewLegacySession;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub credential: String,
    pub platform: String,
}

#[derive(Serialize)]
pub struct UserInfo {
    pub id: Uuid,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    /// Legacy tokens do not rotate; refresh extends the same token, so the
    /// refresh credential is the token itself.
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: UserInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_in: i64,
}

/// Result of resolving a presented legacy token against the session store.
pub enum SessionCheck {
    Valid(LegacySession),
    Invalid(ReasonCode),
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /v1/auth/login — delegate credential verification to the identity
/// provider and mint a platform-bound session token.
///
/// The rejection path is uniform: the response never distinguishes an
/// unknown identifier from a wrong credential. A provider outage is the one
/// deliberate exception, surfaced as `auth_service_unavailable` so clients
/// back off instead of re-prompting the user.
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let ip = client_ip(&headers);

    let Some(platform) = Platform::parse(&req.platform) else {
        return Err(AppError::InvalidRequest(format!(
            "unknown platform '{}'",
            req.platform
        )));
    };

    let verdict = match state
        .idp
        .verify_credentials(&req.identifier, &req.credential)
        .await
    {
        Ok(v) => v,
        Err(AppError::AuthServiceUnavailable) => {
            state.audit.record(
                AuditEvent::failure(
                    ActorType::User,
                    req.identifier.as_str(),
                    "session.login",
                    ReasonCode::IdpUnavailable,
                )
                .with_ip(ip),
            );
            return Err(AppError::AuthServiceUnavailable);
        }
        Err(e) => return Err(e),
    };

    let user_id = match verdict {
        crate::session::idp::IdpVerdict::Verified { user_id } => user_id,
        crate::session::idp::IdpVerdict::Rejected => {
            state.audit.record(
                AuditEvent::failure(
                    ActorType::User,
                    req.identifier.as_str(),
                    "session.login",
                    ReasonCode::InvalidCredentials,
                )
                .with_ip(ip),
            );
            return Err(AppError::InvalidCredentials);
        }
    };

    let session_id = Uuid::new_v4();
    let expires_at = Utc::now() + Duration::seconds(state.config.legacy_session_ttl_secs);
    let token = state
        .issuer
        .sign_session(session_id, user_id, platform.as_str(), expires_at)?;

    state
        .db
        .insert_session(&NewLegacySession {
            id: session_id,
            user_id,
            token_hash: hashing::digest_token(&token),
            platform: platform.as_str().to_string(),
            expires_at,
        })
        .await?;

    // Browser sessions get the double-submit CSRF token for the
    // authorization step; other platforms never see one.
    let csrf_token = if platform == Platform::Web {
        Some(state.csrf.issue(session_id).await?)
    } else {
        None
    };

    state.audit.record(
        AuditEvent::success(ActorType::User, user_id.to_string(), "session.login").with_ip(ip),
    );

    let expires_in = (expires_at - Utc::now()).num_seconds();
    let body = LoginResponse {
        access_token: token.clone(),
        refresh_token: token,
        expires_in,
        user: UserInfo { id: user_id },
        csrf_token: csrf_token.clone(),
    };

    let mut response = (StatusCode::OK, Json(body)).into_response();
    if let Some(csrf) = csrf_token {
        let cookie = format!("{CSRF_COOKIE}={csrf}; Path=/oauth; SameSite=Lax; Max-Age=900");
        if let Ok(v) = axum::http::HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, v);
        }
    }
    Ok(response)
}

/// POST /v1/auth/refresh — extend a live session's expiry. The token itself
/// is unchanged; legacy clients keep the credential they already hold.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RefreshResponse>, AppError> {
    let ip = client_ip(&headers);
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::InvalidRequest("missing bearer token".into()))?
        .to_string();

    let session = match validate_session(&state, &token).await? {
        SessionCheck::Valid(s) => s,
        SessionCheck::Invalid(reason) => {
            state.audit.record(
                AuditEvent::failure(ActorType::User, "-", "session.refresh", reason).with_ip(ip),
            );
            return Err(AppError::InvalidCredentials);
        }
    };

    let new_expires_at = Utc::now() + Duration::seconds(state.config.legacy_session_ttl_secs);
    let extended = state.db.extend_session(session.id, new_expires_at).await?;
    if !extended {
        // Revoked or expired between validation and update.
        state.audit.record(
            AuditEvent::failure(
                ActorType::User,
                session.user_id.to_string(),
                "session.refresh",
                ReasonCode::RevokedSession,
            )
            .with_ip(ip),
        );
        return Err(AppError::InvalidCredentials);
    }

    state.audit.record(
        AuditEvent::success(ActorType::User, session.user_id.to_string(), "session.refresh")
            .with_ip(ip),
    );

    Ok(Json(RefreshResponse {
        access_token: token,
        expires_in: (new_expires_at - Utc::now()).num_seconds(),
    }))
}

/// POST /v1/auth/logout — revoke the session. Logging out twice is not an
/// error; the second call finds the session already revoked and succeeds.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let ip = client_ip(&headers);
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::InvalidRequest("missing bearer token".into()))?
        .to_string();

    match validate_session(&state, &token).await? {
        SessionCheck::Valid(session) => {
            state.db.revoke_session(session.id).await?;
            state.audit.record(
                AuditEvent::success(ActorType::User, session.user_id.to_string(), "session.logout")
                    .with_ip(ip),
            );
            Ok(StatusCode::NO_CONTENT)
        }
        SessionCheck::Invalid(ReasonCode::RevokedSession) => Ok(StatusCode::NO_CONTENT),
        SessionCheck::Invalid(reason) => {
            state
                .audit
                .record(AuditEvent::failure(ActorType::User, "-", "session.logout", reason).with_ip(ip));
            Err(AppError::InvalidCredentials)
        }
    }
}

// ── Validation core ──────────────────────────────────────────

/// Resolve a presented legacy token. The JWT decode is a pre-filter only:
/// a valid signature earns a hash lookup, nothing more. The session row is
/// the trust decision, so revocation takes effect immediately regardless of
/// the token's own expiry claim.
pub async fn validate_session(state: &AppState, token: &str) -> Result<SessionCheck, AppError> {
    if classify(token) != CredentialKind::LegacySession {
        return Ok(SessionCheck::Invalid(ReasonCode::WrongTokenShape));
    }

    let Some(claims) = state.issuer.decode_session(token) else {
        return Ok(SessionCheck::Invalid(ReasonCode::InvalidCredentials));
    };

    let Some(session) = state
        .db
        .get_session_by_hash(&hashing::digest_token(token))
        .await?
    else {
        return Ok(SessionCheck::Invalid(ReasonCode::InvalidCredentials));
    };

    // The row must be the one the claims name. A mismatch means a token
    // was re-signed or a hash collided; either way, reject.
    if session.id != claims.sid || session.user_id != claims.sub {
        return Ok(SessionCheck::Invalid(ReasonCode::InvalidCredentials));
    }

    if session.revoked_at.is_some() {
        return Ok(SessionCheck::Invalid(ReasonCode::RevokedSession));
    }
    if session.expires_at <= Utc::now() {
        return Ok(SessionCheck::Invalid(ReasonCode::ExpiredSession));
    }

    Ok(SessionCheck::Valid(session))
}
