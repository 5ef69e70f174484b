//! Integration tests for credential-shape isolation and the PKCE contract.
//!
//! These tests verify:
//! 1. The three credential populations (OAuth tokens, legacy session JWTs,
//!    vendor keys) classify to distinct shapes and never cross over
//! 2. PKCE verification succeeds iff SHA256(verifier) matches the recorded
//!    challenge, including the RFC 7636 reference vector
//! 3. Redirect URI matching is byte-exact — trailing-slash, query-string,
//!    and prefix variants are all rejected
//! 4. The external error taxonomy keeps its wire shape and status codes

mod shape_isolation_tests {
    use authgate::crypto::tokens::{classify, CredentialKind, TokenIssuer};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(b"integration-test-signing-key-!!!")
    }

    /// Every credential the gateway mints lands in its own shape bucket.
    #[test]
    fn minted_credentials_classify_distinctly() {
        let iss = issuer();
        let session = iss
            .sign_session(Uuid::new_v4(), Uuid::new_v4(), "web", Utc::now() + Duration::hours(1))
            .unwrap();
        let vendor = iss.new_vendor_key("live");

        let kinds = [
            classify(&iss.new_access_token()),
            classify(&iss.new_refresh_token()),
            classify(&iss.new_authorization_code()),
            classify(&session),
            classify(&vendor.bearer_value()),
        ];
        assert_eq!(
            kinds,
            [
                CredentialKind::OauthAccess,
                CredentialKind::OauthRefresh,
                CredentialKind::AuthorizationCode,
                CredentialKind::LegacySession,
                CredentialKind::VendorKey,
            ]
        );
    }

    /// A legacy session token must never read as an OAuth token shape and
    /// vice versa: the validators dispatch on shape before touching storage,
    /// so cross-validation is structurally impossible.
    #[test]
    fn legacy_and_oauth_tokens_never_cross() {
        let iss = issuer();
        let session = iss
            .sign_session(Uuid::new_v4(), Uuid::new_v4(), "cli", Utc::now() + Duration::hours(1))
            .unwrap();

        assert_ne!(classify(&session), CredentialKind::OauthAccess);
        assert_ne!(classify(&session), CredentialKind::OauthRefresh);
        assert_ne!(classify(&iss.new_access_token()), CredentialKind::LegacySession);
        assert_ne!(classify(&iss.new_refresh_token()), CredentialKind::LegacySession);
    }

    /// The session JWT's signature is a pre-filter: a token signed with a
    /// different key decodes to nothing, before any store lookup happens.
    #[test]
    fn foreign_signature_fails_the_prefilter() {
        let token = issuer()
            .sign_session(Uuid::new_v4(), Uuid::new_v4(), "api", Utc::now() + Duration::hours(1))
            .unwrap();
        let other = TokenIssuer::new(b"another-key-entirely-other-key!!");
        assert!(other.decode_session(&token).is_none());
    }
}

mod pkce_tests {
    use authgate::crypto::pkce;

    /// The core exchange property: verification succeeds iff the presented
    /// verifier hashes to the recorded challenge.
    #[test]
    fn verify_iff_hash_matches() {
        let good = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let wrong = "aWellFormedVerifierThatIsSimplyNotTheRightOne";
        let challenge = pkce::compute_s256_challenge(good);

        assert!(pkce::verify(good, &challenge));
        assert!(!pkce::verify(wrong, &challenge));
        assert!(!pkce::verify("", &challenge));
    }

    /// RFC 7636 Appendix B pins the reference verifier/challenge pair.
    #[test]
    fn rfc_7636_reference_vector() {
        assert!(pkce::verify(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
        ));
    }

    /// A challenge presented as a verifier (a common client bug) must fail.
    #[test]
    fn challenge_is_not_its_own_verifier() {
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert!(!pkce::verify(challenge, challenge));
    }
}

mod redirect_exactness_tests {
    use authgate::models::client::OAuthClient;
    use chrono::Utc;
    use uuid::Uuid;

    fn registered(uris: &[&str]) -> OAuthClient {
        OAuthClient {
            id: Uuid::new_v4(),
            client_id: "web-app".into(),
            client_type: "public".into(),
            redirect_uris: uris.iter().map(|s| s.to_string()).collect(),
            allowed_scopes: vec![],
            requires_pkce: true,
            disabled_at: None,
            created_at: Utc::now(),
        }
    }

    /// Byte-for-byte equality only. Every near-miss a lenient matcher would
    /// accept is an open-redirect vector here.
    #[test]
    fn near_miss_uris_are_rejected() {
        let client = registered(&["https://app.example.com/cb"]);

        assert!(client.redirect_allowed("https://app.example.com/cb"));

        for variant in [
            "https://app.example.com/cb/",
            "https://app.example.com/cb?x=1",
            "https://app.example.com/cb#frag",
            "https://app.example.com/CB",
            "http://app.example.com/cb",
            "https://app.example.com/cb/../cb",
            "https://app.example.com.evil.test/cb",
            "https://app.example.com/cbx",
        ] {
            assert!(!client.redirect_allowed(variant), "accepted: {variant}");
        }
    }

    #[test]
    fn each_registered_uri_matches_itself_only() {
        let client = registered(&["https://a.test/cb", "https://b.test/cb"]);
        assert!(client.redirect_allowed("https://a.test/cb"));
        assert!(client.redirect_allowed("https://b.test/cb"));
        assert!(!client.redirect_allowed("https://c.test/cb"));
    }
}

mod error_taxonomy_tests {
    use authgate::errors::AppError;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Programmatic flows answer `{error, error_description}` with the
    /// mapped status, for every variant.
    #[tokio::test]
    async fn wire_shape_and_status_codes() {
        let cases: Vec<(AppError, StatusCode, &str)> = vec![
            (AppError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST, "invalid_request"),
            (AppError::InvalidClient, StatusCode::UNAUTHORIZED, "invalid_client"),
            (AppError::InvalidGrant, StatusCode::BAD_REQUEST, "invalid_grant"),
            (AppError::UnauthorizedClient, StatusCode::BAD_REQUEST, "unauthorized_client"),
            (AppError::AccessDenied, StatusCode::FORBIDDEN, "access_denied"),
            (AppError::InvalidCredentials, StatusCode::UNAUTHORIZED, "invalid_credentials"),
            (
                AppError::RateLimitExceeded { retry_after_secs: 30 },
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded",
            ),
            (
                AppError::AuthServiceUnavailable,
                StatusCode::SERVICE_UNAVAILABLE,
                "auth_service_unavailable",
            ),
        ];

        for (err, status, code) in cases {
            let resp = err.into_response();
            assert_eq!(resp.status(), status, "status for {code}");
            let json = body_json(resp).await;
            assert_eq!(json["error"], code);
            assert!(json["error_description"].is_string());
        }
    }

    /// `invalid_grant` is the answer for every grant-shaped failure; the
    /// body must not vary with the internal cause, so two errors produced
    /// from different paths serialize identically.
    #[tokio::test]
    async fn invalid_grant_is_indistinguishable() {
        let a = body_json(AppError::InvalidGrant.into_response()).await;
        let b = body_json(AppError::InvalidGrant.into_response()).await;
        assert_eq!(a, b);
    }

    /// Rate limiting is a distinct error class with back-off metadata, so
    /// clients throttle instead of re-authenticating.
    #[tokio::test]
    async fn rate_limit_carries_backoff_header() {
        let resp = AppError::RateLimitExceeded { retry_after_secs: 7 }.into_response();
        assert_eq!(resp.headers().get("retry-after").unwrap(), "7");
    }
}
