use anyhow::Result;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{info, warn};

// ── Alert Event Types ─────────────────────────────────────────

/// A structured alert payload sent to operator webhook endpoints.
///
/// These fire for conditions the request path deliberately swallows: failed
/// audit or usage writes, and credential-reuse incidents that return only a
/// coarse error to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    /// Event type identifier, e.g. "refresh_token_reuse", "audit_write_failed".
    pub event_type: String,
    /// ISO-8601 timestamp of when the event occurred.
    pub timestamp: String,
    /// Event-specific details (client, org, error text, chain size, etc.).
    pub details: serde_json::Value,
}

impl AlertEvent {
    /// A rotated refresh token was presented again. Possible token theft;
    /// the chain has already been revoked by the time this fires.
    pub fn refresh_token_reuse(client_id: &str, user_id: &str, revoked_count: u64) -> Self {
        Self {
            event_type: "refresh_token_reuse".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: serde_json::json!({
                "client_id": client_id,
                "user_id": user_id,
                "tokens_revoked": revoked_count,
            }),
        }
    }

    /// An already-consumed authorization code was presented again.
    pub fn authorization_code_reuse(client_id: &str, revoked_count: u64) -> Self {
        Self {
            event_type: "authorization_code_reuse".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: serde_json::json!({
                "client_id": client_id,
                "tokens_revoked": revoked_count,
            }),
        }
    }

    pub fn audit_write_failed(action: &str, error: &str) -> Self {
        Self {
            event_type: "audit_write_failed".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: serde_json::json!({
                "action": action,
                "error": error,
            }),
        }
    }

    pub fn usage_write_failed(org_id: &str, error: &str) -> Self {
        Self {
            event_type: "usage_write_failed".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: serde_json::json!({
                "org_id": org_id,
                "error": error,
            }),
        }
    }
}

// ── HMAC Signing ─────────────────────────────────────────────

/// Compute HMAC-SHA256 of `payload` using `secret`.
/// Returns "sha256=<lowercase hex digest>".
fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    let result = mac.finalize();
    format!("sha256={}", hex::encode(result.into_bytes()))
}

// ── Alert Notifier ───────────────────────────────────────────

/// Dispatches alert events to the configured URLs.
/// Supports:
/// - HMAC-SHA256 signing (X-Authgate-Signature header)
/// - Up to 3 retries with exponential back-off (1s → 5s → 25s)
#[derive(Clone)]
pub struct AlertNotifier {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl AlertNotifier {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("Authgate-Alert/1.0")
                .build()
                .expect("failed to build alert HTTP client"),
            urls,
        }
    }

    /// Send a signed alert to a single URL with retry.
    ///
    /// If `signing_secret` is `Some`, the request body is signed with
    /// HMAC-SHA256 and the signature is sent in the `X-Authgate-Signature`
    /// header. Returns `Ok(())` if delivery succeeded on any attempt.
    pub async fn send_signed(
        &self,
        url: &str,
        event: &AlertEvent,
        signing_secret: Option<&str>,
    ) -> Result<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| anyhow::anyhow!("alert serialize error: {}", e))?;
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = signing_secret.map(|s| hmac_sha256_hex(s, &payload));

        let backoff_secs: &[u64] = &[0, 1, 5, 25];

        for (attempt, &delay) in backoff_secs.iter().enumerate() {
            if delay > 0 {
                tracing::debug!(
                    url,
                    attempt,
                    delay_secs = delay,
                    event_type = %event.event_type,
                    "retrying alert delivery"
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let mut req = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .header("x-authgate-delivery-id", &delivery_id)
                .header("x-authgate-timestamp", &timestamp)
                .header("x-authgate-event", &event.event_type);

            if let Some(ref sig) = signature {
                req = req.header("x-authgate-signature", sig.as_str());
            }

            match req.body(payload.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        "alert delivered"
                    );
                    return Ok(());
                }
                Ok(resp) => {
                    warn!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %resp.status(),
                        "alert delivery failed (non-2xx), will retry"
                    );
                }
                Err(e) => {
                    warn!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        error = %e,
                        "alert request error, will retry"
                    );
                }
            }
        }

        Err(anyhow::anyhow!(
            "alert delivery failed after 3 retries: {}",
            url
        ))
    }

    /// Dispatch an event to all configured URLs, fire-and-forget.
    ///
    /// Each URL is attempted independently with retry; a failure in one
    /// does not block the others, and nothing here ever propagates back to
    /// the request that raised the alert.
    pub fn dispatch(&self, event: AlertEvent) {
        if self.urls.is_empty() {
            return;
        }

        let notifier = self.clone();
        tokio::spawn(async move {
            for url in &notifier.urls {
                if let Err(e) = notifier.send_signed(url, &event, None).await {
                    warn!(url, error = %e, "alert dispatch ultimately failed");
                }
            }
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuse_event_carries_revocation_count() {
        let event = AlertEvent::refresh_token_reuse("web-app", "user-1", 4);
        assert_eq!(event.event_type, "refresh_token_reuse");
        assert_eq!(event.details["client_id"], "web-app");
        assert_eq!(event.details["tokens_revoked"], 4);
        assert!(!event.timestamp.is_empty());
    }

    #[test]
    fn audit_failure_event_carries_error_text() {
        let event = AlertEvent::audit_write_failed("oauth.token", "connection refused");
        assert_eq!(event.event_type, "audit_write_failed");
        assert_eq!(event.details["action"], "oauth.token");
        assert_eq!(event.details["error"], "connection refused");
    }

    #[test]
    fn event_serializes_to_json() {
        let event = AlertEvent::usage_write_failed("org-1", "timeout");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("usage_write_failed"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn hmac_signature_deterministic() {
        let sig1 = hmac_sha256_hex("secret123", b"payload");
        let sig2 = hmac_sha256_hex("secret123", b"payload");
        assert_eq!(sig1, sig2);
        assert!(sig1.starts_with("sha256="));
    }

    #[test]
    fn hmac_signature_depends_on_secret() {
        let sig1 = hmac_sha256_hex("secret1", b"payload");
        let sig2 = hmac_sha256_hex("secret2", b"payload");
        assert_ne!(sig1, sig2);
    }
}
