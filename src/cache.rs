use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound for caching a positive credential lookup. Revocation must
/// take effect within seconds, so nothing derived from a token or key row
/// may outlive this.
pub const POSITIVE_LOOKUP_TTL_SECS: u64 = 5;

/// Entry stored in the local DashMap with an expiry timestamp.
#[derive(Clone)]
pub(crate) struct CacheEntry {
    value: String,
    pub(crate) expires_at: Instant,
}

/// Two-tier cache: in-memory DashMap (tier 1) backed by Redis (tier 2).
/// Postgres is the source of truth for all revocation state; this layer
/// only shaves round-trips off hot lookups, and callers must respect
/// [`POSITIVE_LOOKUP_TTL_SECS`] for anything revocable.
///
/// The local tier honours TTLs: entries are checked on read and evicted
/// lazily. A background sweep can be triggered with `evict_expired()`.
#[derive(Clone)]
pub struct TieredCache {
    pub(crate) local: Arc<DashMap<String, CacheEntry>>,
    redis: ConnectionManager,
}

impl TieredCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            local: Arc::new(DashMap::new()),
            redis,
        }
    }

    pub fn redis(&self) -> ConnectionManager {
        self.redis.clone()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        // tier 1: in-memory (with TTL check)
        if let Some(entry) = self.local.get(key) {
            if Instant::now() < entry.expires_at {
                return serde_json::from_str(&entry.value).ok();
            }
            // expired — drop the ref before removing
            drop(entry);
            self.local.remove(key);
        }

        // tier 2: redis
        let mut conn = self.redis.clone();
        if let Ok(Some(v)) = conn.get::<_, Option<String>>(key).await {
            // Re-use the Redis TTL for the local entry.
            let ttl_secs: i64 = conn.ttl(key).await.unwrap_or(60);
            let ttl = if ttl_secs > 0 {
                Duration::from_secs(ttl_secs as u64)
            } else {
                Duration::from_secs(60)
            };
            self.local.insert(
                key.to_string(),
                CacheEntry {
                    value: v.clone(),
                    expires_at: Instant::now() + ttl,
                },
            );
            return serde_json::from_str(&v).ok();
        }

        None
    }

    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string(value)?;
        self.local.insert(
            key.to_string(),
            CacheEntry {
                value: json.clone(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );

        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key, json, ttl_secs).await?;
        Ok(())
    }

    pub fn invalidate_local(&self, key: &str) {
        self.local.remove(key);
    }

    /// Remove all locally-expired entries. Call this periodically from a
    /// background task to bound memory usage.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.local.len();
        self.local.retain(|_, entry| entry.expires_at > now);
        before - self.local.len()
    }

    /// Current number of entries in the local cache (for metrics / debugging).
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    /// Store a one-time value in Redis only. The local tier is skipped:
    /// single-use semantics require one authoritative copy.
    pub async fn put_one_time(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    /// Atomically read and delete a one-time value. A second call for the
    /// same key returns `None`, as does any call after the TTL has passed.
    pub async fn take_one_time(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.redis.clone();
        let value: Option<String> = redis::cmd("GETDEL").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    /// Atomic fixed-window counter: INCR + EXPIRE in one Lua script.
    pub async fn increment(&self, key: &str, window_secs: u64) -> anyhow::Result<u64> {
        let mut conn = self.redis.clone();
        let script = redis::Script::new(
            r#"
            local current = redis.call("INCR", KEYS[1])
            if current == 1 then
                redis.call("EXPIRE", KEYS[1], ARGV[1])
            end
            return current
        "#,
        );
        let count: u64 = script
            .key(key)
            .arg(window_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    /// Sliding-window count over two adjacent fixed windows: increments the
    /// current bucket and returns the weighted total
    /// `previous * (1 - elapsed_fraction) + current`, scaled by 1000 to stay
    /// integral inside Lua. The approximation can under- or over-estimate at
    /// the margin but never double-counts a single increment.
    pub async fn sliding_increment(
        &self,
        current_key: &str,
        previous_key: &str,
        window_secs: u64,
        elapsed_millis_in_window: u64,
    ) -> anyhow::Result<u64> {
        let mut conn = self.redis.clone();
        let script = redis::Script::new(
            r#"
            local curr = redis.call("INCR", KEYS[1])
            if curr == 1 then
                redis.call("EXPIRE", KEYS[1], ARGV[1] * 2)
            end
            local prev = tonumber(redis.call("GET", KEYS[2]) or "0")
            local elapsed = tonumber(ARGV[2])
            local window = tonumber(ARGV[1]) * 1000
            local weighted = prev * (window - elapsed) + curr * window
            return math.floor(weighted / window)
        "#,
        );
        let count: u64 = script
            .key(current_key)
            .key(previous_key)
            .arg(window_secs)
            .arg(elapsed_millis_in_window)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }
}
