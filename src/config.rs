use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    /// HS256 key for signing legacy session tokens.
    pub session_signing_key: String,
    pub admin_key: Option<String>,
    /// Comma-separated list of webhook URLs alerted on swallowed failures
    /// (audit/usage write errors, token-reuse incidents).
    pub alert_webhook_urls: Vec<String>,
    /// Base URL of the external identity provider used for credential
    /// verification during legacy login.
    pub idp_base_url: String,
    /// Timeout for identity-provider calls, in seconds.
    pub idp_timeout_secs: u64,
    /// Authorization code lifetime. Short by design.
    pub auth_code_ttl_secs: i64,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub legacy_session_ttl_secs: i64,
    /// Per-tenant fallback when an organization row carries no limit.
    pub default_rate_limit_per_minute: u32,
}

impl Config {
    /// Admin key for the management API. Falls back to the signing key if
    /// AUTHGATE_ADMIN_KEY is not set.
    pub fn admin_key(&self) -> &str {
        self.admin_key.as_deref().unwrap_or(&self.session_signing_key)
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let session_signing_key = std::env::var("AUTHGATE_SIGNING_KEY")
        .unwrap_or_else(|_| "CHANGE_ME_32_BYTE_HEX_KEY".into());

    if session_signing_key == "CHANGE_ME_32_BYTE_HEX_KEY" {
        let env_mode = std::env::var("AUTHGATE_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "AUTHGATE_SIGNING_KEY is still the insecure placeholder. \
                 Set a proper 64-char hex key before running in production."
            );
        }
        eprintln!("⚠️  AUTHGATE_SIGNING_KEY is not set — using insecure placeholder. Set a 64-char hex key for production.");
    }

    Ok(Config {
        port: std::env::var("AUTHGATE_PORT")
            .unwrap_or_else(|_| "8443".into())
            .parse()
            .unwrap_or(8443),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/authgate".into()),
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
        session_signing_key,
        admin_key: std::env::var("AUTHGATE_ADMIN_KEY").ok(),
        alert_webhook_urls: std::env::var("AUTHGATE_ALERT_WEBHOOK_URLS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        idp_base_url: std::env::var("AUTHGATE_IDP_URL")
            .unwrap_or_else(|_| "http://localhost:9100".into()),
        idp_timeout_secs: env_parse("AUTHGATE_IDP_TIMEOUT_SECS", 5),
        auth_code_ttl_secs: env_parse("AUTHGATE_CODE_TTL_SECS", 600),
        access_token_ttl_secs: env_parse("AUTHGATE_ACCESS_TTL_SECS", 3600),
        refresh_token_ttl_secs: env_parse("AUTHGATE_REFRESH_TTL_SECS", 30 * 86_400),
        legacy_session_ttl_secs: env_parse("AUTHGATE_SESSION_TTL_SECS", 30 * 86_400),
        default_rate_limit_per_minute: env_parse("AUTHGATE_DEFAULT_RPM", 600),
    })
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
