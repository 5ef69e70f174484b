//! Background job: purge credentials that can never authenticate again.
//!
//! Runs hourly. Deletes authorization codes long past expiry and token and
//! session rows that have been dead for over 30 days. Audit events are never
//! touched — the trail outlives every credential it describes.

use std::time::Duration;

use tokio::time;

use crate::store::postgres::PgStore;

/// Spawn the background cleanup task. Call this once at startup.
pub fn spawn(store: PgStore) {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(3600)); // every hour
        loop {
            interval.tick().await;
            if let Err(e) = sweep(&store).await {
                tracing::error!("cleanup job failed: {}", e);
            }
        }
    });
}

async fn sweep(store: &PgStore) -> anyhow::Result<()> {
    let codes = store.delete_expired_codes().await?;
    if codes > 0 {
        tracing::info!(rows = codes, "purged expired authorization codes");
    }

    let tokens = store.purge_stale_tokens().await?;
    if tokens > 0 {
        tracing::info!(rows = tokens, "purged stale oauth tokens");
    }

    let sessions = store.purge_stale_sessions().await?;
    if sessions > 0 {
        tracing::info!(rows = sessions, "purged stale legacy sessions");
    }

    Ok(())
}
