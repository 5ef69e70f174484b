use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::models::usage::UsageRecord;
use crate::notification::webhook::{AlertEvent, AlertNotifier};

/// Flat compute-cost approximation per millisecond of processing time.
/// Billing refines this downstream; the gateway only records the estimate.
pub fn estimated_cost(latency_ms: i32) -> Decimal {
    // $0.000002 per ms
    Decimal::from(latency_ms.max(0)) * Decimal::new(2, 6)
}

/// Fire-and-forget usage accounting. The insert runs on a spawned task:
/// the authorization decision that produced the record has already been
/// returned to the caller, and a failed write is alerted, never surfaced.
pub fn record_async(pool: PgPool, alerts: AlertNotifier, record: UsageRecord) {
    tokio::spawn(async move {
        if let Err(e) = insert_usage(&pool, &record).await {
            tracing::error!(org_id = %record.org_id, "failed to write usage record: {}", e);
            alerts.dispatch(AlertEvent::usage_write_failed(
                &record.org_id.to_string(),
                &e.to_string(),
            ));
        }
    });
}

async fn insert_usage(pool: &PgPool, record: &UsageRecord) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO usage_records (id, org_id, key_id, service, latency_ms, estimated_cost_usd, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record.id)
    .bind(record.org_id)
    .bind(&record.key_id)
    .bind(&record.service)
    .bind(record.latency_ms)
    .bind(record.estimated_cost_usd)
    .bind(record.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_scales_with_latency() {
        assert_eq!(estimated_cost(0), Decimal::ZERO);
        assert_eq!(estimated_cost(1000), Decimal::new(2000, 6));
        assert!(estimated_cost(500) < estimated_cost(501));
    }

    #[test]
    fn negative_latency_clamps_to_zero() {
        assert_eq!(estimated_cost(-5), Decimal::ZERO);
    }
}
