use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::client::OAuthClient;
use crate::models::session::LegacySession;
use crate::models::token::{AuthorizationCode, OAuthToken};
use crate::models::vendor::{VendorApiKey, VendorOrganization};

/// Single retry with a short backoff, for idempotent reads only. Writes —
/// above all the authorization-code consumption — are never retried: a
/// replayed consumption write risks double issuance.
const READ_RETRY_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .acquire_timeout(Duration::from_secs(5))
            // Every statement carries a server-side timeout; a stuck query
            // must fail the request, not hold it.
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("SET statement_timeout = '5s'")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // -- OAuth Client Operations --

    pub async fn insert_client(&self, client: &NewOAuthClient) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO oauth_clients (client_id, client_type, redirect_uris, allowed_scopes, requires_pkce)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id"#,
        )
        .bind(&client.client_id)
        .bind(&client.client_type)
        .bind(&client.redirect_uris)
        .bind(&client.allowed_scopes)
        .bind(client.requires_pkce)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_client(&self, client_id: &str) -> anyhow::Result<Option<OAuthClient>> {
        let row = read_with_retry(|| {
            sqlx::query_as::<_, OAuthClient>(
                "SELECT id, client_id, client_type, redirect_uris, allowed_scopes, requires_pkce, disabled_at, created_at FROM oauth_clients WHERE client_id = $1"
            )
            .bind(client_id)
            .fetch_optional(&self.pool)
        })
        .await?;
        Ok(row)
    }

    pub async fn list_clients(&self) -> anyhow::Result<Vec<OAuthClient>> {
        let rows = sqlx::query_as::<_, OAuthClient>(
            "SELECT id, client_id, client_type, redirect_uris, allowed_scopes, requires_pkce, disabled_at, created_at FROM oauth_clients ORDER BY created_at ASC"
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Soft-disable. Clients are never deleted while tokens reference them.
    pub async fn disable_client(&self, client_id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE oauth_clients SET disabled_at = NOW() WHERE client_id = $1 AND disabled_at IS NULL",
        )
        .bind(client_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The only mutable client field at runtime.
    pub async fn update_redirect_uris(
        &self,
        client_id: &str,
        redirect_uris: &[String],
    ) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE oauth_clients SET redirect_uris = $2 WHERE client_id = $1")
                .bind(client_id)
                .bind(redirect_uris)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Authorization Code Operations --

    pub async fn insert_authorization_code(
        &self,
        code: &NewAuthorizationCode,
    ) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO authorization_codes
               (code_hash, client_id, user_id, redirect_uri, code_challenge, code_challenge_method, scope, expires_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING id"#,
        )
        .bind(&code.code_hash)
        .bind(&code.client_id)
        .bind(code.user_id)
        .bind(&code.redirect_uri)
        .bind(&code.code_challenge)
        .bind(&code.code_challenge_method)
        .bind(&code.scope)
        .bind(code.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Atomic test-and-set consumption. The conditional UPDATE decides the
    /// race: of N concurrent exchanges for the same code, exactly one gets
    /// the row back, the rest get `None`. Never retried.
    pub async fn consume_code_by_hash(
        &self,
        code_hash: &str,
    ) -> anyhow::Result<Option<AuthorizationCode>> {
        let row = sqlx::query_as::<_, AuthorizationCode>(
            r#"UPDATE authorization_codes
               SET consumed_at = NOW()
               WHERE code_hash = $1 AND consumed_at IS NULL
               RETURNING id, code_hash, client_id, user_id, redirect_uri, code_challenge, code_challenge_method, scope, expires_at, consumed_at, created_at"#,
        )
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Plain lookup, used after a failed consumption to distinguish an
    /// unknown code from a replayed one (internally — the caller's wire
    /// response is the same either way).
    pub async fn get_code_by_hash(
        &self,
        code_hash: &str,
    ) -> anyhow::Result<Option<AuthorizationCode>> {
        let row = read_with_retry(|| {
            sqlx::query_as::<_, AuthorizationCode>(
                "SELECT id, code_hash, client_id, user_id, redirect_uri, code_challenge, code_challenge_method, scope, expires_at, consumed_at, created_at FROM authorization_codes WHERE code_hash = $1"
            )
            .bind(code_hash)
            .fetch_optional(&self.pool)
        })
        .await?;
        Ok(row)
    }

    // -- OAuth Token Operations --

    /// Insert the initial access+refresh pair minted from a code exchange,
    /// in one transaction.
    pub async fn insert_token_pair(
        &self,
        access: &NewOAuthToken,
        refresh: &NewOAuthToken,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_token_tx(&mut tx, access).await?;
        insert_token_tx(&mut tx, refresh).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_token_by_hash(&self, token_hash: &str) -> anyhow::Result<Option<OAuthToken>> {
        let row = read_with_retry(|| {
            sqlx::query_as::<_, OAuthToken>(
                "SELECT id, token_hash, token_type, user_id, client_id, scope, parent_token_id, auth_code_id, issued_at, expires_at, revoked_at FROM oauth_tokens WHERE token_hash = $1"
            )
            .bind(token_hash)
            .fetch_optional(&self.pool)
        })
        .await?;
        Ok(row)
    }

    /// Rotate a refresh token: revoke the old one, then insert the new pair
    /// with `parent_token_id` set, all in one transaction. Revoke-first
    /// ordering means a crash mid-way leaves the old token merely dead,
    /// never double-usable.
    ///
    /// Returns `false` when the conditional revoke touched no row — a
    /// concurrent rotation got there first, which the caller must treat as
    /// reuse.
    pub async fn rotate_refresh_token(
        &self,
        old_refresh_id: Uuid,
        access: &NewOAuthToken,
        refresh: &NewOAuthToken,
    ) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            "UPDATE oauth_tokens SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(old_refresh_id)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_token_tx(&mut tx, access).await?;
        insert_token_tx(&mut tx, refresh).await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn revoke_token(&self, token_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE oauth_tokens SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke a token and every descendant minted from it, walking the
    /// `parent_token_id` lineage in the store. Returns the number of tokens
    /// newly revoked.
    pub async fn revoke_chain(&self, root_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"WITH RECURSIVE chain AS (
                   SELECT id FROM oauth_tokens WHERE id = $1
                   UNION ALL
                   SELECT t.id FROM oauth_tokens t JOIN chain c ON t.parent_token_id = c.id
               )
               UPDATE oauth_tokens SET revoked_at = NOW()
               WHERE id IN (SELECT id FROM chain) AND revoked_at IS NULL"#,
        )
        .bind(root_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Revoke every token descended from an authorization code. Rotation
    /// propagates `auth_code_id`, so the whole lineage is one indexed update.
    pub async fn revoke_tokens_for_code(&self, code_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE oauth_tokens SET revoked_at = NOW() WHERE auth_code_id = $1 AND revoked_at IS NULL",
        )
        .bind(code_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -- Legacy Session Operations --

    pub async fn insert_session(&self, session: &NewLegacySession) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO legacy_sessions (id, user_id, token_hash, platform, expires_at)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(&session.platform)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_session_by_hash(
        &self,
        token_hash: &str,
    ) -> anyhow::Result<Option<LegacySession>> {
        let row = read_with_retry(|| {
            sqlx::query_as::<_, LegacySession>(
                "SELECT id, user_id, token_hash, platform, created_at, expires_at, revoked_at FROM legacy_sessions WHERE token_hash = $1"
            )
            .bind(token_hash)
            .fetch_optional(&self.pool)
        })
        .await?;
        Ok(row)
    }

    /// Extend a live session's expiry. Legacy tokens do not rotate: the hash
    /// stays, only `expires_at` moves.
    pub async fn extend_session(
        &self,
        session_id: Uuid,
        new_expires_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE legacy_sessions SET expires_at = $2 WHERE id = $1 AND revoked_at IS NULL AND expires_at > NOW()",
        )
        .bind(session_id)
        .bind(new_expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn revoke_session(&self, session_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE legacy_sessions SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Vendor Organization / Key Operations --

    pub async fn insert_org(&self, org: &NewVendorOrganization) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO vendor_organizations (vendor_code, allowed_platforms, allowed_services, rate_limit_per_minute)
               VALUES ($1, $2, $3, $4)
               RETURNING id"#,
        )
        .bind(&org.vendor_code)
        .bind(&org.allowed_platforms)
        .bind(&org.allowed_services)
        .bind(org.rate_limit_per_minute)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_org(&self, org_id: Uuid) -> anyhow::Result<Option<VendorOrganization>> {
        let row = read_with_retry(|| {
            sqlx::query_as::<_, VendorOrganization>(
                "SELECT id, vendor_code, allowed_platforms, allowed_services, rate_limit_per_minute, created_at FROM vendor_organizations WHERE id = $1"
            )
            .bind(org_id)
            .fetch_optional(&self.pool)
        })
        .await?;
        Ok(row)
    }

    pub async fn get_org_by_code(
        &self,
        vendor_code: &str,
    ) -> anyhow::Result<Option<VendorOrganization>> {
        let row = sqlx::query_as::<_, VendorOrganization>(
            "SELECT id, vendor_code, allowed_platforms, allowed_services, rate_limit_per_minute, created_at FROM vendor_organizations WHERE vendor_code = $1"
        )
        .bind(vendor_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_orgs(&self) -> anyhow::Result<Vec<VendorOrganization>> {
        let rows = sqlx::query_as::<_, VendorOrganization>(
            "SELECT id, vendor_code, allowed_platforms, allowed_services, rate_limit_per_minute, created_at FROM vendor_organizations ORDER BY created_at ASC"
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn insert_vendor_key(&self, key: &NewVendorApiKey) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO vendor_api_keys (key_id, key_secret_hash, org_id, key_type, environment)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id"#,
        )
        .bind(&key.key_id)
        .bind(&key.key_secret_hash)
        .bind(key.org_id)
        .bind(&key.key_type)
        .bind(&key.environment)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_vendor_key(&self, key_id: &str) -> anyhow::Result<Option<VendorApiKey>> {
        let row = read_with_retry(|| {
            sqlx::query_as::<_, VendorApiKey>(
                "SELECT id, key_id, key_secret_hash, org_id, key_type, environment, revoked_at, created_at FROM vendor_api_keys WHERE key_id = $1"
            )
            .bind(key_id)
            .fetch_optional(&self.pool)
        })
        .await?;
        Ok(row)
    }

    pub async fn revoke_vendor_key(&self, key_id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE vendor_api_keys SET revoked_at = NOW() WHERE key_id = $1 AND revoked_at IS NULL",
        )
        .bind(key_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Audit Trail (reads only — inserts live with the audit writer) --

    pub async fn list_audit_events(
        &self,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<AuditLogRow>> {
        let rows = sqlx::query_as::<_, AuditLogRow>(
            "SELECT id, actor_type, actor_id, action, outcome, reason_code, severity, ip, created_at FROM audit_events ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -- Cleanup (background job) --

    /// Purge authorization codes past expiry for over an hour. Consumed or
    /// not, they can never be exchanged again.
    pub async fn delete_expired_codes(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM authorization_codes WHERE expires_at < NOW() - INTERVAL '1 hour' AND NOT EXISTS (SELECT 1 FROM oauth_tokens t WHERE t.auth_code_id = authorization_codes.id)",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Purge tokens that have been expired or revoked for over 30 days.
    /// Audit rows are untouched: the trail outlives the credentials.
    pub async fn purge_stale_tokens(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"DELETE FROM oauth_tokens
               WHERE (expires_at < NOW() - INTERVAL '30 days'
                      OR revoked_at < NOW() - INTERVAL '30 days')
               AND id NOT IN (SELECT parent_token_id FROM oauth_tokens WHERE parent_token_id IS NOT NULL)"#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn purge_stale_sessions(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM legacy_sessions WHERE expires_at < NOW() - INTERVAL '30 days'",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

async fn insert_token_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token: &NewOAuthToken,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO oauth_tokens (id, token_hash, token_type, user_id, client_id, scope, parent_token_id, auth_code_id, expires_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
    )
    .bind(token.id)
    .bind(&token.token_hash)
    .bind(&token.token_type)
    .bind(token.user_id)
    .bind(&token.client_id)
    .bind(&token.scope)
    .bind(token.parent_token_id)
    .bind(token.auth_code_id)
    .bind(token.expires_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Run an idempotent read, retrying once on a transient connection error.
async fn read_with_retry<T, F, Fut>(op: F) -> Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    match op().await {
        Err(e) if is_transient(&e) => {
            tracing::warn!("transient database error, retrying read: {}", e);
            tokio::time::sleep(READ_RETRY_BACKOFF).await;
            op().await
        }
        other => other,
    }
}

fn is_transient(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

// -- Insert payloads --

pub struct NewOAuthClient {
    pub client_id: String,
    pub client_type: String,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub requires_pkce: bool,
}

pub struct NewAuthorizationCode {
    pub code_hash: String,
    pub client_id: String,
    pub user_id: Uuid,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
}

pub struct NewOAuthToken {
    pub id: Uuid,
    pub token_hash: String,
    pub token_type: String,
    pub user_id: Uuid,
    pub client_id: String,
    pub scope: String,
    pub parent_token_id: Option<Uuid>,
    pub auth_code_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
}

pub struct NewLegacySession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub platform: String,
    pub expires_at: DateTime<Utc>,
}

pub struct NewVendorOrganization {
    pub vendor_code: String,
    pub allowed_platforms: Vec<String>,
    pub allowed_services: serde_json::Value,
    pub rate_limit_per_minute: i32,
}

pub struct NewVendorApiKey {
    pub key_id: String,
    pub key_secret_hash: String,
    pub org_id: Uuid,
    pub key_type: String,
    pub environment: String,
}

/// Flat audit row for the management API listing.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AuditLogRow {
    pub id: Uuid,
    pub actor_type: String,
    pub actor_id: String,
    pub action: String,
    pub outcome: String,
    pub reason_code: Option<String>,
    pub severity: String,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
}
