use sqlx::PgPool;

use crate::models::audit::AuditEvent;
use crate::notification::webhook::{AlertEvent, AlertNotifier};

/// Async audit writer. Every authorization decision — success or failure —
/// goes through here exactly once; the insert runs on a spawned task so the
/// response path never waits on it.
///
/// A failed write is swallowed from the caller's perspective and raised to
/// operators through the alert webhook instead.
#[derive(Clone)]
pub struct AuditWriter {
    pool: PgPool,
    alerts: AlertNotifier,
}

impl AuditWriter {
    pub fn new(pool: PgPool, alerts: AlertNotifier) -> Self {
        Self { pool, alerts }
    }

    pub fn record(&self, event: AuditEvent) {
        let pool = self.pool.clone();
        let alerts = self.alerts.clone();
        tokio::spawn(async move {
            if let Err(e) = insert_audit_event(&pool, &event).await {
                tracing::error!(action = %event.action, "failed to write audit event: {}", e);
                alerts.dispatch(AlertEvent::audit_write_failed(&event.action, &e.to_string()));
            } else {
                tracing::debug!(action = %event.action, outcome = event.outcome.as_str(), "audit event recorded");
            }
        });
    }
}

async fn insert_audit_event(pool: &PgPool, event: &AuditEvent) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_events (id, actor_type, actor_id, action, outcome, reason_code, severity, ip, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(event.id)
    .bind(event.actor_type.as_str())
    .bind(&event.actor_id)
    .bind(&event.action)
    .bind(event.outcome.as_str())
    .bind(event.reason_code.map(|r| r.as_str()))
    .bind(event.severity.as_str())
    .bind(&event.ip)
    .bind(event.created_at)
    .execute(pool)
    .await?;

    Ok(())
}
