use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::csrf::CSRF_COOKIE;
use crate::crypto::hashing;
use crate::crypto::pkce;
use crate::crypto::tokens::{classify, CredentialKind};
use crate::errors::AppError;
use crate::middleware::vendor_auth::{bearer_token, client_ip};
use crate::models::audit::{ActorType, AuditEvent, ReasonCode};
use crate::models::client::OAuthClient;
use crate::models::session::{LegacySession, Platform};
use crate::models::token::{AuthorizationCode, OAuthToken, TokenResponse, TokenType};
use crate::notification::webhook::AlertEvent;
use crate::session::handlers::{validate_session, SessionCheck};
use crate::store::postgres::{NewAuthorizationCode, NewOAuthToken};
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct AuthorizeParams {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: Option<String>,
    pub scope: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub state: Option<String>,
    pub csrf_token: Option<String>,
}

#[derive(Deserialize)]
pub struct TokenParams {
    pub grant_type: String,
    pub code: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Deserialize)]
pub struct TokenOnly {
    pub token: String,
}

#[derive(Serialize)]
pub struct IntrospectResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl IntrospectResponse {
    fn inactive() -> Self {
        Self {
            active: false,
            scope: None,
            client_id: None,
            exp: None,
        }
    }
}

// ── /oauth/authorize ─────────────────────────────────────────

/// GET /oauth/authorize — validate the request and mint a single-use
/// authorization code.
///
/// Client and redirect URI are checked before anything else: until both
/// pass, no error is ever delivered by redirect, because redirecting to an
/// unregistered URI is an open-redirect primitive. Once the redirect target
/// is known-good, every further failure goes back to the client app as
/// `error`/`error_description` query parameters.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Result<Response, AppError> {
    let ip = client_ip(&headers);
    let audit = &state.audit;

    let client = match state.db.get_client(&params.client_id).await? {
        Some(c) => c,
        None => {
            audit.record(
                AuditEvent::failure(
                    ActorType::Client,
                    params.client_id.as_str(),
                    "oauth.authorize",
                    ReasonCode::InvalidClient,
                )
                .with_ip(ip),
            );
            return Err(AppError::InvalidClient);
        }
    };

    if !client.is_enabled() {
        audit.record(
            AuditEvent::failure(
                ActorType::Client,
                params.client_id.as_str(),
                "oauth.authorize",
                ReasonCode::DisabledClient,
            )
            .with_ip(ip),
        );
        return Err(AppError::InvalidClient);
    }

    // Exact-match only. A redirect_uri that is not byte-identical to a
    // registered one gets a 400, never a redirect.
    if !client.redirect_allowed(&params.redirect_uri) {
        audit.record(
            AuditEvent::failure(
                ActorType::Client,
                params.client_id.as_str(),
                "oauth.authorize",
                ReasonCode::InvalidRedirect,
            )
            .with_ip(ip),
        );
        return Err(AppError::InvalidRequest("redirect_uri is not registered".into()));
    }

    // The redirect target is trusted from here on.
    let fail = |reason: ReasonCode, error: &str, description: &str| -> Response {
        audit.record(
            AuditEvent::failure(ActorType::Client, params.client_id.as_str(), "oauth.authorize", reason)
                .with_ip(ip.clone()),
        );
        redirect_with_error(&params.redirect_uri, error, description, params.state.as_deref())
    };

    // The authorizing user proves identity with an existing legacy session,
    // presented as a bearer header or the session cookie set by login.
    let session = match session_token(&headers) {
        None => {
            return Ok(fail(
                ReasonCode::Unauthenticated,
                "access_denied",
                "authentication required",
            ))
        }
        Some(token) => match validate_session(&state, &token).await? {
            SessionCheck::Valid(s) => s,
            SessionCheck::Invalid(reason) => {
                return Ok(fail(reason, "access_denied", "authentication required"))
            }
        },
    };

    if params.response_type.as_deref() != Some("code") {
        return Ok(fail(
            ReasonCode::InvalidRequest,
            "unsupported_response_type",
            "only response_type=code is supported",
        ));
    }

    let challenge = match validate_challenge(&client, &params) {
        Ok(c) => c,
        Err((reason, error, description)) => return Ok(fail(reason, error, description)),
    };

    let scope = params.scope.clone().unwrap_or_default();
    if !client.scope_allowed(&scope) {
        return Ok(fail(
            ReasonCode::ScopeDenied,
            "access_denied",
            "requested scope exceeds the client grant",
        ));
    }

    // Browser-initiated attempts present the double-submit CSRF token
    // issued at login; it is consumed here, exactly once.
    let browser = session.platform == Platform::Web.as_str();
    if browser && !csrf_ok(&state, &headers, &session, params.csrf_token.as_deref()).await? {
        return Ok(fail(
            ReasonCode::CsrfFailure,
            "access_denied",
            "authorization attempt could not be verified",
        ));
    }

    let code = state.issuer.new_authorization_code();
    let expires_at = Utc::now() + Duration::seconds(state.config.auth_code_ttl_secs);
    state
        .db
        .insert_authorization_code(&NewAuthorizationCode {
            code_hash: hashing::digest_token(&code),
            client_id: client.client_id.clone(),
            user_id: session.user_id,
            redirect_uri: params.redirect_uri.clone(),
            code_challenge: challenge,
            code_challenge_method: pkce::METHOD_S256.to_string(),
            scope,
            expires_at,
        })
        .await?;

    audit.record(
        AuditEvent::success(ActorType::Client, client.client_id.clone(), "oauth.authorize")
            .with_ip(ip),
    );

    let mut location = url::Url::parse(&params.redirect_uri)
        .map_err(|_| AppError::InvalidRequest("redirect_uri is not a valid URL".into()))?;
    location.query_pairs_mut().append_pair("code", &code);
    if let Some(s) = &params.state {
        location.query_pairs_mut().append_pair("state", s);
    }

    let mut response = redirect_to(location.as_str());
    if browser {
        // Re-arm the guard for the next attempt from this session.
        let fresh = state.csrf.issue(session.id).await?;
        let cookie = format!("{CSRF_COOKIE}={fresh}; Path=/oauth; SameSite=Lax; Max-Age=900");
        if let Ok(v) = axum::http::HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, v);
        }
    }
    Ok(response)
}

/// PKCE parameter validation for the authorization request. Returns the
/// challenge to store; an empty string means the (confidential, non-PKCE)
/// client skipped PKCE.
fn validate_challenge(
    client: &OAuthClient,
    params: &AuthorizeParams,
) -> Result<String, (ReasonCode, &'static str, &'static str)> {
    match params.code_challenge.as_deref() {
        None | Some("") => {
            if client.requires_pkce {
                Err((
                    ReasonCode::InvalidPkce,
                    "invalid_request",
                    "code_challenge is required",
                ))
            } else {
                Ok(String::new())
            }
        }
        Some(challenge) => {
            if params.code_challenge_method.as_deref() != Some(pkce::METHOD_S256) {
                return Err((
                    ReasonCode::InvalidPkce,
                    "invalid_request",
                    "code_challenge_method must be S256",
                ));
            }
            // A BASE64URL-encoded SHA-256 digest is always 43 characters.
            if challenge.len() != 43 {
                return Err((
                    ReasonCode::InvalidPkce,
                    "invalid_request",
                    "malformed code_challenge",
                ));
            }
            Ok(challenge.to_string())
        }
    }
}

async fn csrf_ok(
    state: &AppState,
    headers: &HeaderMap,
    session: &LegacySession,
    presented: Option<&str>,
) -> Result<bool, AppError> {
    let Some(presented) = presented else {
        return Ok(false);
    };

    // Double submit: when the browser carries the cookie half, both halves
    // must agree before the stored copy is even consulted.
    if let Some(cookie) = cookie_value(headers, CSRF_COOKIE) {
        if cookie != presented {
            return Ok(false);
        }
    }

    Ok(state.csrf.consume(session.id, presented).await?)
}

// ── /oauth/token ─────────────────────────────────────────────

/// POST /oauth/token — exchange an authorization code or rotate a refresh
/// token. Failures inside either grant collapse to `invalid_grant`: the
/// response never reveals which check failed. The audit trail keeps the
/// distinction.
pub async fn token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<TokenParams>,
) -> Result<Json<TokenResponse>, AppError> {
    match params.grant_type.as_str() {
        "authorization_code" => exchange_code(state, headers, params).await,
        "refresh_token" => rotate_refresh(state, headers, params).await,
        other => Err(AppError::InvalidRequest(format!(
            "unsupported grant_type '{other}'"
        ))),
    }
}

async fn exchange_code(
    state: Arc<AppState>,
    headers: HeaderMap,
    params: TokenParams,
) -> Result<Json<TokenResponse>, AppError> {
    let ip = client_ip(&headers);
    let audit = &state.audit;

    let (Some(code), Some(client_id), Some(redirect_uri)) =
        (&params.code, &params.client_id, &params.redirect_uri)
    else {
        return Err(AppError::InvalidRequest(
            "code, client_id and redirect_uri are required".into(),
        ));
    };

    let client = match state.db.get_client(client_id).await? {
        Some(c) if c.is_enabled() => c,
        _ => {
            audit.record(
                AuditEvent::failure(ActorType::Client, client_id.as_str(), "oauth.token.exchange", ReasonCode::InvalidClient)
                    .with_ip(ip),
            );
            return Err(AppError::InvalidClient);
        }
    };

    let fail = |reason: ReasonCode| -> AppError {
        audit.record(
            AuditEvent::failure(ActorType::Client, client_id.as_str(), "oauth.token.exchange", reason)
                .with_ip(ip.clone()),
        );
        AppError::InvalidGrant
    };

    // Reject foreign credential shapes before touching the store.
    if classify(code) != CredentialKind::AuthorizationCode {
        return Err(fail(ReasonCode::WrongTokenShape));
    }

    let code_hash = hashing::digest_token(code);

    // Atomic test-and-set: of N racing exchanges, exactly one gets the row.
    let Some(row) = state.db.consume_code_by_hash(&code_hash).await? else {
        return match state.db.get_code_by_hash(&code_hash).await? {
            Some(consumed) => {
                // Second exchange of a consumed code: a theft indicator.
                // Kill everything the code ever produced before answering.
                let revoked = state.db.revoke_tokens_for_code(consumed.id).await?;
                audit.record(
                    AuditEvent::failure(ActorType::Client, client_id.as_str(), "oauth.token.exchange", ReasonCode::ReusedCode)
                        .high_severity()
                        .with_ip(ip.clone()),
                );
                state
                    .alerts
                    .dispatch(AlertEvent::authorization_code_reuse(client_id, revoked));
                Err(AppError::InvalidGrant)
            }
            None => Err(fail(ReasonCode::UnknownCode)),
        };
    };

    if row.client_id != *client_id {
        return Err(fail(ReasonCode::InvalidClient));
    }
    if row.redirect_uri != *redirect_uri {
        return Err(fail(ReasonCode::InvalidRedirect));
    }
    if row.is_expired(Utc::now()) {
        return Err(fail(ReasonCode::ExpiredCode));
    }
    if !pkce_verified(&client, &row, params.code_verifier.as_deref()) {
        return Err(fail(ReasonCode::InvalidPkce));
    }

    let response = issue_pair(&state, &row.client_id, row.user_id, &row.scope, row.id).await?;

    audit.record(
        AuditEvent::success(ActorType::Client, client_id.clone(), "oauth.token.exchange").with_ip(ip),
    );
    Ok(Json(response))
}

fn pkce_verified(client: &OAuthClient, row: &AuthorizationCode, verifier: Option<&str>) -> bool {
    if row.code_challenge.is_empty() {
        // Only a confidential client could have authorized without PKCE.
        return !client.requires_pkce;
    }
    match verifier {
        Some(v) => pkce::verify(v, &row.code_challenge),
        None => false,
    }
}

async fn rotate_refresh(
    state: Arc<AppState>,
    headers: HeaderMap,
    params: TokenParams,
) -> Result<Json<TokenResponse>, AppError> {
    let ip = client_ip(&headers);
    let audit = &state.audit;
    let actor = params.client_id.clone().unwrap_or_else(|| "-".into());

    let Some(refresh_token) = &params.refresh_token else {
        return Err(AppError::InvalidRequest("refresh_token is required".into()));
    };

    let fail = |reason: ReasonCode| -> AppError {
        audit.record(
            AuditEvent::failure(ActorType::Client, actor.as_str(), "oauth.token.refresh", reason)
                .with_ip(ip.clone()),
        );
        AppError::InvalidGrant
    };

    if classify(refresh_token) != CredentialKind::OauthRefresh {
        return Err(fail(ReasonCode::WrongTokenShape));
    }

    let Some(old) = state
        .db
        .get_token_by_hash(&hashing::digest_token(refresh_token))
        .await?
    else {
        return Err(fail(ReasonCode::UnknownToken));
    };

    if !old.is_refresh() {
        return Err(fail(ReasonCode::WrongTokenShape));
    }
    if let Some(client_id) = &params.client_id {
        if *client_id != old.client_id {
            return Err(fail(ReasonCode::InvalidClient));
        }
    }

    if old.revoked_at.is_some() {
        reuse_incident(&state, &old, ip.clone()).await?;
        return Err(AppError::InvalidGrant);
    }
    if old.expires_at <= Utc::now() {
        return Err(fail(ReasonCode::ExpiredToken));
    }

    let access = new_token(&state, TokenType::Access, &old, state.config.access_token_ttl_secs);
    let refresh = new_token(&state, TokenType::Refresh, &old, state.config.refresh_token_ttl_secs);
    let (access_plain, refresh_plain) = (access.0, refresh.0);

    // Revoke-then-insert inside one transaction. Losing the conditional
    // revoke means another request rotated this token concurrently, which
    // is reuse by definition.
    let rotated = state
        .db
        .rotate_refresh_token(old.id, &access.1, &refresh.1)
        .await?;
    if !rotated {
        reuse_incident(&state, &old, ip.clone()).await?;
        return Err(AppError::InvalidGrant);
    }

    audit.record(
        AuditEvent::success(ActorType::Client, old.client_id.clone(), "oauth.token.refresh")
            .with_ip(ip),
    );

    Ok(Json(TokenResponse {
        access_token: access_plain,
        refresh_token: refresh_plain,
        token_type: "Bearer".to_string(),
        expires_in: state.config.access_token_ttl_secs,
        scope: old.scope,
    }))
}

/// A rotated refresh token came back. Revoke the whole chain rooted at it
/// and raise the alarm internally; the caller still answers with the same
/// coarse error every other grant failure gets.
async fn reuse_incident(
    state: &AppState,
    token: &OAuthToken,
    ip: Option<String>,
) -> Result<(), AppError> {
    let revoked = state.db.revoke_chain(token.id).await?;
    state.audit.record(
        AuditEvent::failure(
            ActorType::Client,
            token.client_id.clone(),
            "oauth.token.refresh",
            ReasonCode::ReusedRefreshToken,
        )
        .high_severity()
        .with_ip(ip),
    );
    state.alerts.dispatch(AlertEvent::refresh_token_reuse(
        &token.client_id,
        &token.user_id.to_string(),
        revoked,
    ));
    Ok(())
}

/// Mint one opaque token and its insert payload, derived from the parent
/// refresh token being rotated.
fn new_token(
    state: &AppState,
    token_type: TokenType,
    parent: &OAuthToken,
    ttl_secs: i64,
) -> (String, NewOAuthToken) {
    let plain = match token_type {
        TokenType::Access => state.issuer.new_access_token(),
        TokenType::Refresh => state.issuer.new_refresh_token(),
    };
    let row = NewOAuthToken {
        id: Uuid::new_v4(),
        token_hash: hashing::digest_token(&plain),
        token_type: token_type.as_str().to_string(),
        user_id: parent.user_id,
        client_id: parent.client_id.clone(),
        scope: parent.scope.clone(),
        parent_token_id: Some(parent.id),
        auth_code_id: parent.auth_code_id,
        expires_at: Utc::now() + Duration::seconds(ttl_secs),
    };
    (plain, row)
}

/// Mint and persist the initial access+refresh pair from a code exchange.
/// `parent_token_id` starts out NULL; rotation is what builds the chain.
async fn issue_pair(
    state: &AppState,
    client_id: &str,
    user_id: Uuid,
    scope: &str,
    auth_code_id: Uuid,
) -> Result<TokenResponse, AppError> {
    let access_plain = state.issuer.new_access_token();
    let refresh_plain = state.issuer.new_refresh_token();
    let now = Utc::now();

    let access = NewOAuthToken {
        id: Uuid::new_v4(),
        token_hash: hashing::digest_token(&access_plain),
        token_type: TokenType::Access.as_str().to_string(),
        user_id,
        client_id: client_id.to_string(),
        scope: scope.to_string(),
        parent_token_id: None,
        auth_code_id: Some(auth_code_id),
        expires_at: now + Duration::seconds(state.config.access_token_ttl_secs),
    };
    let refresh = NewOAuthToken {
        id: Uuid::new_v4(),
        token_hash: hashing::digest_token(&refresh_plain),
        token_type: TokenType::Refresh.as_str().to_string(),
        user_id,
        client_id: client_id.to_string(),
        scope: scope.to_string(),
        parent_token_id: None,
        auth_code_id: Some(auth_code_id),
        expires_at: now + Duration::seconds(state.config.refresh_token_ttl_secs),
    };

    state.db.insert_token_pair(&access, &refresh).await?;

    Ok(TokenResponse {
        access_token: access_plain,
        refresh_token: refresh_plain,
        token_type: "Bearer".to_string(),
        expires_in: state.config.access_token_ttl_secs,
        scope: scope.to_string(),
    })
}

// ── /oauth/revoke ────────────────────────────────────────────

/// POST /oauth/revoke — always 204, found or not. A distinguishable
/// response would be an oracle for guessing live token values.
pub async fn revoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<TokenOnly>,
) -> Result<StatusCode, AppError> {
    let ip = client_ip(&headers);

    let kind = classify(&params.token);
    if matches!(kind, CredentialKind::OauthAccess | CredentialKind::OauthRefresh) {
        if let Some(token) = state
            .db
            .get_token_by_hash(&hashing::digest_token(&params.token))
            .await?
        {
            if token.is_refresh() {
                // Revoking a refresh token takes its descendants with it.
                state.db.revoke_chain(token.id).await?;
            } else {
                state.db.revoke_token(token.id).await?;
            }
            state.audit.record(
                AuditEvent::success(ActorType::Client, token.client_id, "oauth.revoke").with_ip(ip),
            );
            return Ok(StatusCode::NO_CONTENT);
        }
    }

    state
        .audit
        .record(AuditEvent::success(ActorType::Client, "-", "oauth.revoke").with_ip(ip));
    Ok(StatusCode::NO_CONTENT)
}

// ── /oauth/introspect ────────────────────────────────────────

/// POST /oauth/introspect — RFC 7662 shape. Anything that is not a live
/// OAuth token of ours — revoked, expired, unknown, or a foreign credential
/// format — is simply `active: false`.
pub async fn introspect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<TokenOnly>,
) -> Result<Json<IntrospectResponse>, AppError> {
    let ip = client_ip(&headers);

    let kind = classify(&params.token);
    if !matches!(kind, CredentialKind::OauthAccess | CredentialKind::OauthRefresh) {
        // Legacy session tokens and vendor keys are never cross-validated
        // here; the wrong shape is inactive by definition.
        state.audit.record(
            AuditEvent::failure(ActorType::Client, "-", "oauth.introspect", ReasonCode::WrongTokenShape)
                .with_ip(ip),
        );
        return Ok(Json(IntrospectResponse::inactive()));
    }

    let token = state
        .db
        .get_token_by_hash(&hashing::digest_token(&params.token))
        .await?;

    let response = match token {
        Some(t) if t.is_active(Utc::now()) => {
            state.audit.record(
                AuditEvent::success(ActorType::Client, t.client_id.clone(), "oauth.introspect")
                    .with_ip(ip),
            );
            IntrospectResponse {
                active: true,
                scope: Some(t.scope),
                client_id: Some(t.client_id),
                exp: Some(t.expires_at.timestamp()),
            }
        }
        _ => {
            state.audit.record(
                AuditEvent::success(ActorType::Client, "-", "oauth.introspect").with_ip(ip),
            );
            IntrospectResponse::inactive()
        }
    };

    Ok(Json(response))
}

// ── Helpers ──────────────────────────────────────────────────

/// 302 redirect. Built by hand: the authorization endpoint is pinned to the
/// status code the OAuth flow expects.
fn redirect_to(location: &str) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    if let Ok(v) = axum::http::HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, v);
    }
    response
}

fn redirect_with_error(
    redirect_uri: &str,
    error: &str,
    description: &str,
    state: Option<&str>,
) -> Response {
    match url::Url::parse(redirect_uri) {
        Ok(mut location) => {
            location.query_pairs_mut().append_pair("error", error);
            location
                .query_pairs_mut()
                .append_pair("error_description", description);
            if let Some(s) = state {
                location.query_pairs_mut().append_pair("state", s);
            }
            redirect_to(location.as_str())
        }
        // Registered but unparseable: fall back to a plain JSON error.
        Err(_) => AppError::InvalidRequest("redirect_uri is not a valid URL".into()).into_response(),
    }
}

/// The authorizing user's session token: bearer header first, then the
/// session cookie set by the browser login flow.
fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = bearer_token(headers) {
        return Some(token.to_string());
    }
    cookie_value(headers, "authgate_session")
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn client(requires_pkce: bool) -> OAuthClient {
        OAuthClient {
            id: Uuid::new_v4(),
            client_id: "web-app".into(),
            client_type: if requires_pkce { "public" } else { "confidential" }.into(),
            redirect_uris: vec!["https://app.example.com/cb".into()],
            allowed_scopes: vec!["read".into()],
            requires_pkce,
            disabled_at: None,
            created_at: Utc::now(),
        }
    }

    fn params(challenge: Option<&str>, method: Option<&str>) -> AuthorizeParams {
        AuthorizeParams {
            client_id: "web-app".into(),
            redirect_uri: "https://app.example.com/cb".into(),
            response_type: Some("code".into()),
            scope: None,
            code_challenge: challenge.map(String::from),
            code_challenge_method: method.map(String::from),
            state: None,
            csrf_token: None,
        }
    }

    fn code_row(challenge: &str) -> AuthorizationCode {
        AuthorizationCode {
            id: Uuid::new_v4(),
            code_hash: "h".into(),
            client_id: "web-app".into(),
            user_id: Uuid::new_v4(),
            redirect_uri: "https://app.example.com/cb".into(),
            code_challenge: challenge.into(),
            code_challenge_method: pkce::METHOD_S256.into(),
            scope: "read".into(),
            expires_at: Utc::now() + Duration::minutes(10),
            consumed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn challenge_required_for_public_clients() {
        let err = validate_challenge(&client(true), &params(None, None)).unwrap_err();
        assert_eq!(err.0, ReasonCode::InvalidPkce);
    }

    #[test]
    fn challenge_optional_for_confidential_clients() {
        let stored = validate_challenge(&client(false), &params(None, None)).unwrap();
        assert!(stored.is_empty());
    }

    #[test]
    fn plain_method_is_rejected() {
        let challenge = pkce::compute_s256_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        let err =
            validate_challenge(&client(true), &params(Some(&challenge), Some("plain"))).unwrap_err();
        assert_eq!(err.0, ReasonCode::InvalidPkce);

        let ok = validate_challenge(&client(true), &params(Some(&challenge), Some("S256")));
        assert!(ok.is_ok());
    }

    #[test]
    fn pkce_verification_matches_challenge() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let row = code_row(&pkce::compute_s256_challenge(verifier));

        assert!(pkce_verified(&client(true), &row, Some(verifier)));
        assert!(!pkce_verified(&client(true), &row, Some("wrong-verifier-wrong-verifier-wrong-verifier")));
        assert!(!pkce_verified(&client(true), &row, None));
    }

    #[test]
    fn missing_challenge_passes_only_without_pkce_requirement() {
        let row = code_row("");
        assert!(pkce_verified(&client(false), &row, None));
        assert!(!pkce_verified(&client(true), &row, None));
    }

    #[test]
    fn error_redirect_preserves_state() {
        let resp = redirect_with_error(
            "https://app.example.com/cb",
            "access_denied",
            "authentication required",
            Some("xyz"),
        );
        assert_eq!(resp.status(), StatusCode::FOUND);
        let location = resp.headers().get(header::LOCATION).unwrap().to_str().unwrap();
        assert!(location.starts_with("https://app.example.com/cb?"));
        assert!(location.contains("error=access_denied"));
        assert!(location.contains("state=xyz"));
    }

    #[test]
    fn introspect_inactive_has_no_claims() {
        let json = serde_json::to_value(IntrospectResponse::inactive()).unwrap();
        assert_eq!(json, serde_json::json!({ "active": false }));
    }

    #[test]
    fn cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("a=1; authgate_csrf=tok123; b=2"),
        );
        assert_eq!(cookie_value(&headers, "authgate_csrf"), Some("tok123".into()));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }
}
