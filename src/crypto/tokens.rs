//! Token issuance and credential-shape classification.
//!
//! Three credential populations cross this gateway and each has a distinct
//! syntactic shape. Dispatch happens on shape alone, before any validation
//! runs, and no validator ever falls back to trying another format.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque OAuth access token prefix.
pub const ACCESS_PREFIX: &str = "oaat_";
/// Opaque OAuth refresh token prefix.
pub const REFRESH_PREFIX: &str = "oart_";
/// Authorization code prefix.
pub const CODE_PREFIX: &str = "oac_";
/// Vendor key-id prefix.
pub const VENDOR_PREFIX: &str = "vk_";

/// Syntactic credential families. Classification never touches storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    OauthAccess,
    OauthRefresh,
    AuthorizationCode,
    /// Three-segment JWT, the legacy session shape.
    LegacySession,
    /// `key_id.key_secret` with a `vk_` key id.
    VendorKey,
    Unknown,
}

/// Classify a presented credential by shape.
pub fn classify(credential: &str) -> CredentialKind {
    if credential.starts_with(VENDOR_PREFIX) {
        return CredentialKind::VendorKey;
    }
    if credential.starts_with(ACCESS_PREFIX) {
        return CredentialKind::OauthAccess;
    }
    if credential.starts_with(REFRESH_PREFIX) {
        return CredentialKind::OauthRefresh;
    }
    if credential.starts_with(CODE_PREFIX) {
        return CredentialKind::AuthorizationCode;
    }
    // JWTs are exactly three non-empty dot-separated segments.
    let mut segments = credential.split('.');
    if let (Some(h), Some(p), Some(s), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    {
        if !h.is_empty() && !p.is_empty() && !s.is_empty() {
            return CredentialKind::LegacySession;
        }
    }
    CredentialKind::Unknown
}

/// Claims embedded in a legacy session token. The signature and claims are a
/// pre-filter only; the session row lookup is the trust decision.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Session id.
    pub sid: Uuid,
    /// User id.
    pub sub: Uuid,
    pub platform: String,
    pub iat: i64,
    pub exp: i64,
}

/// Freshly issued vendor key material. The secret exists in plaintext only
/// in this struct, at issuance time.
#[derive(Debug)]
pub struct VendorKeyMaterial {
    pub key_id: String,
    pub key_secret: String,
}

impl VendorKeyMaterial {
    /// The single presentation format: `Authorization: Bearer <key_id>.<key_secret>`.
    pub fn bearer_value(&self) -> String {
        format!("{}.{}", self.key_id, self.key_secret)
    }
}

/// Mints every credential the gateway issues.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(session_signing_key: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(session_signing_key),
            decoding_key: DecodingKey::from_secret(session_signing_key),
        }
    }

    pub fn new_access_token(&self) -> String {
        random_token(ACCESS_PREFIX)
    }

    pub fn new_refresh_token(&self) -> String {
        random_token(REFRESH_PREFIX)
    }

    pub fn new_authorization_code(&self) -> String {
        random_token(CODE_PREFIX)
    }

    pub fn new_vendor_key(&self, key_type: &str) -> VendorKeyMaterial {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(14)
            .map(char::from)
            .collect();
        VendorKeyMaterial {
            key_id: format!("{VENDOR_PREFIX}{key_type}_{suffix}"),
            key_secret: random_value(),
        }
    }

    /// Sign a legacy session token (HS256).
    pub fn sign_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        platform: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let claims = SessionClaims {
            sid: session_id,
            sub: user_id,
            platform: platform.to_string(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// Decode and signature-check a legacy session token. A `None` here is a
    /// rejection; a `Some` is only permission to do the hash lookup.
    pub fn decode_session(&self, token: &str) -> Option<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .ok()
    }
}

/// 32 bytes of OS entropy, base64url without padding: 256 bits per token.
fn random_value() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn random_token(prefix: &str) -> String {
    format!("{prefix}{}", random_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(b"test-signing-key-32-bytes-long!!")
    }

    #[test]
    fn opaque_tokens_carry_their_shape() {
        let iss = issuer();
        assert_eq!(classify(&iss.new_access_token()), CredentialKind::OauthAccess);
        assert_eq!(classify(&iss.new_refresh_token()), CredentialKind::OauthRefresh);
        assert_eq!(
            classify(&iss.new_authorization_code()),
            CredentialKind::AuthorizationCode
        );
    }

    #[test]
    fn opaque_tokens_are_unique_and_long() {
        let iss = issuer();
        let a = iss.new_access_token();
        let b = iss.new_access_token();
        assert_ne!(a, b);
        // 32 bytes base64url = 43 chars after the prefix.
        assert_eq!(a.len(), ACCESS_PREFIX.len() + 43);
    }

    #[test]
    fn session_sign_decode_roundtrip() {
        let iss = issuer();
        let sid = Uuid::new_v4();
        let uid = Uuid::new_v4();
        let token = iss
            .sign_session(sid, uid, "cli", Utc::now() + Duration::hours(1))
            .unwrap();

        assert_eq!(classify(&token), CredentialKind::LegacySession);

        let claims = iss.decode_session(&token).unwrap();
        assert_eq!(claims.sid, sid);
        assert_eq!(claims.sub, uid);
        assert_eq!(claims.platform, "cli");
    }

    #[test]
    fn expired_session_token_fails_decode() {
        let iss = issuer();
        let token = iss
            .sign_session(
                Uuid::new_v4(),
                Uuid::new_v4(),
                "web",
                Utc::now() - Duration::hours(1),
            )
            .unwrap();
        assert!(iss.decode_session(&token).is_none());
    }

    #[test]
    fn tampered_session_token_fails_decode() {
        let iss = issuer();
        let token = iss
            .sign_session(Uuid::new_v4(), Uuid::new_v4(), "web", Utc::now() + Duration::hours(1))
            .unwrap();
        let other = TokenIssuer::new(b"a-completely-different-key-here!");
        assert!(other.decode_session(&token).is_none());
    }

    #[test]
    fn vendor_keys_classify_as_vendor() {
        let material = issuer().new_vendor_key("live");
        assert!(material.key_id.starts_with("vk_live_"));
        assert_eq!(classify(&material.bearer_value()), CredentialKind::VendorKey);
    }

    #[test]
    fn oauth_and_legacy_shapes_never_cross() {
        let iss = issuer();
        let access = iss.new_access_token();
        let session = iss
            .sign_session(Uuid::new_v4(), Uuid::new_v4(), "cli", Utc::now() + Duration::hours(1))
            .unwrap();

        // An OAuth token is not a JWT shape; a JWT is not an OAuth shape.
        assert_ne!(classify(&access), CredentialKind::LegacySession);
        assert_ne!(classify(&session), CredentialKind::OauthAccess);
    }

    #[test]
    fn garbage_is_unknown() {
        assert_eq!(classify(""), CredentialKind::Unknown);
        assert_eq!(classify("plain-string"), CredentialKind::Unknown);
        assert_eq!(classify("a.b"), CredentialKind::Unknown);
        assert_eq!(classify("a..b"), CredentialKind::Unknown);
    }
}
