//! Client for the external identity provider.
//!
//! The gateway never sees password hashes for user accounts; credential
//! verification is delegated wholesale. The only thing that matters here is
//! keeping the two failure families apart: a rejected credential and an
//! unreachable provider produce different errors, because conflating them
//! would make an outage look like a credential problem in logs and clients.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// Outcome of a credential check against the provider.
///
/// `Rejected` is uniform on purpose: the provider's distinction between
/// "no such account" and "wrong password" is not propagated, which closes
/// off account enumeration at this boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdpVerdict {
    Verified { user_id: Uuid },
    Rejected,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    identifier: &'a str,
    credential: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    user_id: Uuid,
}

#[derive(Clone)]
pub struct IdpClient {
    client: reqwest::Client,
    base_url: String,
}

impl IdpClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .user_agent("Authgate-Idp/1.0")
                .build()
                .expect("failed to build identity provider HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Verify a credential pair. Timeouts, connection failures, and provider
    /// 5xx responses all surface as `AuthServiceUnavailable`; every 4xx is a
    /// plain rejection.
    pub async fn verify_credentials(
        &self,
        identifier: &str,
        credential: &str,
    ) -> Result<IdpVerdict, AppError> {
        let url = format!("{}/v1/credentials/verify", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&VerifyRequest {
                identifier,
                credential,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("identity provider unreachable: {}", e);
                AppError::AuthServiceUnavailable
            })?;

        let status = response.status();
        if status.is_success() {
            let body: VerifyResponse = response.json().await.map_err(|e| {
                tracing::error!("identity provider returned malformed body: {}", e);
                AppError::AuthServiceUnavailable
            })?;
            return Ok(IdpVerdict::Verified {
                user_id: body.user_id,
            });
        }

        if status.is_client_error() {
            return Ok(IdpVerdict::Rejected);
        }

        tracing::warn!(status = %status, "identity provider error response");
        Err(AppError::AuthServiceUnavailable)
    }
}
