use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-request usage accounting for billing. Written asynchronously after
/// every authorized vendor request; a failed write never affects the
/// authorization decision that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub key_id: String,
    pub service: String,
    pub latency_ms: i32,
    pub estimated_cost_usd: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(org_id: Uuid, key_id: &str, service: &str, latency_ms: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            key_id: key_id.to_string(),
            service: service.to_string(),
            latency_ms,
            estimated_cost_usd: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_cost(mut self, cost: Decimal) -> Self {
        self.estimated_cost_usd = Some(cost);
        self
    }
}
