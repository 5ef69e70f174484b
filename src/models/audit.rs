use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One authorization decision, success or failure. Append-only: the
/// application inserts events and never mutates or deletes them.
///
/// `reason_code` carries the detailed internal cause; the external error
/// response stays deliberately coarser (oracle avoidance), so the audit
/// trail is the only place the distinction is visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub action: String,
    pub outcome: Outcome,
    pub reason_code: Option<ReasonCode>,
    pub severity: Severity,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn success(actor_type: ActorType, actor_id: impl Into<String>, action: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_type,
            actor_id: actor_id.into(),
            action: action.to_string(),
            outcome: Outcome::Success,
            reason_code: None,
            severity: Severity::Info,
            ip: None,
            created_at: Utc::now(),
        }
    }

    pub fn failure(
        actor_type: ActorType,
        actor_id: impl Into<String>,
        action: &str,
        reason: ReasonCode,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_type,
            actor_id: actor_id.into(),
            action: action.to_string(),
            outcome: Outcome::Failure,
            reason_code: Some(reason),
            severity: Severity::Info,
            ip: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }

    /// Escalate the event. Used for theft indicators such as reuse of a
    /// rotated refresh token or an already-consumed authorization code.
    pub fn high_severity(mut self) -> Self {
        self.severity = Severity::High;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    User,
    Client,
    Vendor,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Client => "client",
            Self::Vendor => "vendor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::High => "high",
        }
    }
}

/// Machine-readable internal failure causes. These distinguish checks the
/// external taxonomy deliberately collapses into `invalid_grant` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    InvalidRequest,
    InvalidClient,
    DisabledClient,
    InvalidRedirect,
    InvalidPkce,
    UnknownCode,
    ExpiredCode,
    ReusedCode,
    UnknownToken,
    ExpiredToken,
    RevokedToken,
    ReusedRefreshToken,
    WrongTokenShape,
    InvalidCredentials,
    IdpUnavailable,
    ExpiredSession,
    RevokedSession,
    CsrfFailure,
    MalformedKey,
    UnknownKey,
    BadKeySecret,
    RevokedKey,
    PlatformDenied,
    ServiceDenied,
    RateLimited,
    ScopeDenied,
    Unauthenticated,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::DisabledClient => "disabled_client",
            Self::InvalidRedirect => "invalid_redirect",
            Self::InvalidPkce => "invalid_pkce",
            Self::UnknownCode => "unknown_code",
            Self::ExpiredCode => "expired_code",
            Self::ReusedCode => "reused_code",
            Self::UnknownToken => "unknown_token",
            Self::ExpiredToken => "expired_token",
            Self::RevokedToken => "revoked_token",
            Self::ReusedRefreshToken => "reused_refresh_token",
            Self::WrongTokenShape => "wrong_token_shape",
            Self::InvalidCredentials => "invalid_credentials",
            Self::IdpUnavailable => "idp_unavailable",
            Self::ExpiredSession => "expired_session",
            Self::RevokedSession => "revoked_session",
            Self::CsrfFailure => "csrf_failure",
            Self::MalformedKey => "malformed_key",
            Self::UnknownKey => "unknown_key",
            Self::BadKeySecret => "bad_key_secret",
            Self::RevokedKey => "revoked_key",
            Self::PlatformDenied => "platform_denied",
            Self::ServiceDenied => "service_denied",
            Self::RateLimited => "rate_limited",
            Self::ScopeDenied => "scope_denied",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuse_events_escalate() {
        let ev = AuditEvent::failure(
            ActorType::Client,
            "web-app",
            "oauth.token.refresh",
            ReasonCode::ReusedRefreshToken,
        )
        .high_severity();

        assert_eq!(ev.outcome, Outcome::Failure);
        assert_eq!(ev.severity, Severity::High);
        assert_eq!(ev.reason_code.unwrap().as_str(), "reused_refresh_token");
    }
}
