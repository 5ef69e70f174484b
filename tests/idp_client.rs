//! Integration tests for the external identity-provider client.
//!
//! These tests verify:
//! 1. A 200 with a user id verifies the credential
//! 2. Every 4xx collapses into the same uniform rejection — the provider's
//!    "no such account" vs "wrong password" distinction never crosses this
//!    boundary
//! 3. Provider 5xx responses and timeouts surface as the distinct
//!    `auth_service_unavailable` failure, not as bad credentials
//!
//! The provider is stubbed with wiremock; no external services required.

mod idp_verification_tests {
    use authgate::errors::AppError;
    use authgate::session::idp::{IdpClient, IdpVerdict};
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn verified_credential_returns_user_id() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/v1/credentials/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "user_id": user_id })))
            .mount(&server)
            .await;

        let client = IdpClient::new(&server.uri(), 2);
        let verdict = client.verify_credentials("user@example.com", "hunter2").await.unwrap();
        assert_eq!(verdict, IdpVerdict::Verified { user_id });
    }

    #[tokio::test]
    async fn all_client_errors_reject_uniformly() {
        // Unknown account (404) and wrong password (401) must be
        // indistinguishable to our caller.
        for status in [400u16, 401, 403, 404, 422] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/credentials/verify"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let client = IdpClient::new(&server.uri(), 2);
            let verdict = client.verify_credentials("who@example.com", "pw").await.unwrap();
            assert_eq!(verdict, IdpVerdict::Rejected, "status {status}");
        }
    }

    #[tokio::test]
    async fn provider_5xx_is_unavailable_not_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/credentials/verify"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = IdpClient::new(&server.uri(), 2);
        let err = client.verify_credentials("user@example.com", "pw").await.unwrap_err();
        assert!(matches!(err, AppError::AuthServiceUnavailable));
    }

    #[tokio::test]
    async fn provider_timeout_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/credentials/verify"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "user_id": Uuid::new_v4() }))
                    .set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        // Client timeout well below the stubbed delay.
        let client = IdpClient::new(&server.uri(), 1);
        let err = client.verify_credentials("user@example.com", "pw").await.unwrap_err();
        assert!(matches!(err, AppError::AuthServiceUnavailable));
    }

    #[tokio::test]
    async fn malformed_success_body_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/credentials/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = IdpClient::new(&server.uri(), 2);
        let err = client.verify_credentials("user@example.com", "pw").await.unwrap_err();
        assert!(matches!(err, AppError::AuthServiceUnavailable));
    }
}
