use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::cache::TieredCache;

/// Sliding window length. Vendor quotas are defined per minute.
const WINDOW_SECS: i64 = 60;
const WINDOW_MILLIS: f64 = (WINDOW_SECS * 1000) as f64;

/// Outcome of a rate-limit check for one tenant.
#[derive(Debug, Clone, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Per-tenant sliding one-minute window. Two implementations: a shared
/// Redis counter for multi-instance deployments and an in-process map for
/// single-node ones. The contract is implementation-agnostic; counting is
/// a two-bucket weighted approximation in both, which can be off at the
/// window margin but never double-counts an increment.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, org_id: Uuid, limit_per_minute: u32) -> anyhow::Result<RateDecision>;
}

fn window_index(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(WINDOW_SECS)
}

fn elapsed_millis_in_window(now: DateTime<Utc>) -> i64 {
    now.timestamp_millis().rem_euclid(WINDOW_SECS * 1000)
}

fn reset_at(now: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp((window_index(now) + 1) * WINDOW_SECS, 0).unwrap_or(now)
}

fn decision(weighted_count: u64, limit: u32, now: DateTime<Utc>) -> RateDecision {
    RateDecision {
        allowed: weighted_count <= limit as u64,
        remaining: (limit as u64).saturating_sub(weighted_count) as u32,
        reset_at: reset_at(now),
    }
}

// ── Redis implementation ─────────────────────────────────────

/// Shared-store limiter: one Lua round-trip per check, atomic per tenant.
pub struct RedisRateLimiter {
    cache: TieredCache,
}

impl RedisRateLimiter {
    pub fn new(cache: TieredCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, org_id: Uuid, limit_per_minute: u32) -> anyhow::Result<RateDecision> {
        let now = Utc::now();
        let idx = window_index(now);
        let current_key = format!("rl:{org_id}:{idx}");
        let previous_key = format!("rl:{org_id}:{}", idx - 1);

        let weighted = self
            .cache
            .sliding_increment(
                &current_key,
                &previous_key,
                WINDOW_SECS as u64,
                elapsed_millis_in_window(now) as u64,
            )
            .await?;

        Ok(decision(weighted, limit_per_minute, now))
    }
}

// ── In-memory implementation ─────────────────────────────────

struct WindowState {
    index: i64,
    current: u64,
    previous: u64,
}

/// Single-instance limiter. State lives in the process and does not survive
/// a restart; deployments with more than one instance need the Redis one.
#[derive(Default)]
pub struct MemoryRateLimiter {
    windows: DashMap<Uuid, WindowState>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock-injected core of `check`.
    pub fn check_at(
        &self,
        now: DateTime<Utc>,
        org_id: Uuid,
        limit_per_minute: u32,
    ) -> RateDecision {
        let idx = window_index(now);

        let mut state = self.windows.entry(org_id).or_insert(WindowState {
            index: idx,
            current: 0,
            previous: 0,
        });

        if state.index != idx {
            // Roll the window forward. A gap of more than one window means
            // the previous bucket contributes nothing.
            state.previous = if state.index == idx - 1 {
                state.current
            } else {
                0
            };
            state.index = idx;
            state.current = 0;
        }

        state.current += 1;

        let frac = elapsed_millis_in_window(now) as f64 / WINDOW_MILLIS;
        let weighted =
            (state.previous as f64 * (1.0 - frac) + state.current as f64).floor() as u64;

        decision(weighted, limit_per_minute, now)
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(&self, org_id: Uuid, limit_per_minute: u32) -> anyhow::Result<RateDecision> {
        Ok(self.check_at(Utc::now(), org_id, limit_per_minute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_040 + secs, 0).unwrap()
    }

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = MemoryRateLimiter::new();
        let org = Uuid::new_v4();
        let now = at(0);

        for i in 0..5 {
            let d = limiter.check_at(now, org, 5);
            assert!(d.allowed, "request {} should pass", i + 1);
        }
        let d = limiter.check_at(now, org, 5);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
    }

    #[test]
    fn remaining_counts_down() {
        let limiter = MemoryRateLimiter::new();
        let org = Uuid::new_v4();
        let now = at(0);

        assert_eq!(limiter.check_at(now, org, 3).remaining, 2);
        assert_eq!(limiter.check_at(now, org, 3).remaining, 1);
        assert_eq!(limiter.check_at(now, org, 3).remaining, 0);
    }

    #[test]
    fn window_rollover_restores_budget() {
        let limiter = MemoryRateLimiter::new();
        let org = Uuid::new_v4();

        for _ in 0..3 {
            limiter.check_at(at(0), org, 3);
        }
        assert!(!limiter.check_at(at(0), org, 3).allowed);

        // Two full windows later the previous bucket has no weight left.
        assert!(limiter.check_at(at(121), org, 3).allowed);
    }

    #[test]
    fn previous_window_still_weighs_in_early() {
        let limiter = MemoryRateLimiter::new();
        let org = Uuid::new_v4();

        // Fill the first window completely.
        for _ in 0..10 {
            limiter.check_at(at(0), org, 10);
        }

        // Right at the next window boundary the previous count still
        // applies in full, so the budget is not simply reset.
        let d = limiter.check_at(at(60), org, 10);
        assert!(!d.allowed);
    }

    #[test]
    fn tenants_are_isolated() {
        let limiter = MemoryRateLimiter::new();
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let now = at(0);

        for _ in 0..4 {
            limiter.check_at(now, org_a, 3);
        }
        assert!(!limiter.check_at(now, org_a, 3).allowed);
        assert!(limiter.check_at(now, org_b, 3).allowed);
    }

    #[test]
    fn reset_at_is_the_next_window_boundary() {
        let limiter = MemoryRateLimiter::new();
        let d = limiter.check_at(at(10), Uuid::new_v4(), 5);
        assert_eq!(d.reset_at.timestamp() % 60, 0);
        assert!(d.reset_at > at(10));
        assert!(d.reset_at <= at(70));
    }
}
