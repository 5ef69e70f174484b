//! Integration tests for the per-tenant sliding-window rate limiter.
//!
//! These tests verify:
//! 1. Monotonicity: for a tenant with limit R, the (R+1)-th request inside
//!    one window is rejected, and a request after the window rolls over
//!    succeeds
//! 2. The limiter trait object works the way the vendor authorizer uses it
//! 3. Tenants never share a window
//!
//! The in-memory implementation is exercised directly; the Redis one runs
//! the same two-bucket weighting server-side and needs a live Redis.

mod sliding_window_tests {
    use authgate::middleware::rate_limit::{MemoryRateLimiter, RateLimiter};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    // A window-aligned instant, so weighting from the previous bucket is
    // zero at the start of the test.
    fn window_start() -> chrono::DateTime<chrono::Utc> {
        Utc.timestamp_opt(1_700_000_040, 0).unwrap()
    }

    #[test]
    fn r_plus_one_is_rejected() {
        let limiter = MemoryRateLimiter::new();
        let org = Uuid::new_v4();
        let r = 10;

        for i in 0..r {
            assert!(
                limiter.check_at(window_start(), org, r).allowed,
                "request {} of {} should be allowed",
                i + 1,
                r
            );
        }
        let over = limiter.check_at(window_start(), org, r);
        assert!(!over.allowed);
        assert_eq!(over.remaining, 0);
    }

    #[test]
    fn budget_returns_after_rollover() {
        let limiter = MemoryRateLimiter::new();
        let org = Uuid::new_v4();
        let start = window_start();

        for _ in 0..=3 {
            limiter.check_at(start, org, 3);
        }
        assert!(!limiter.check_at(start, org, 3).allowed);

        // Two windows later the old count carries no weight.
        let later = start + chrono::Duration::seconds(125);
        let d = limiter.check_at(later, org, 3);
        assert!(d.allowed);
        assert!(d.reset_at > later);
    }

    #[test]
    fn windows_are_per_tenant() {
        let limiter = MemoryRateLimiter::new();
        let exhausted = Uuid::new_v4();
        let fresh = Uuid::new_v4();

        for _ in 0..5 {
            limiter.check_at(window_start(), exhausted, 2);
        }
        assert!(!limiter.check_at(window_start(), exhausted, 2).allowed);
        assert!(limiter.check_at(window_start(), fresh, 2).allowed);
    }

    /// The vendor authorizer holds the limiter as `Arc<dyn RateLimiter>`;
    /// the trait surface must stay object-safe and usable through it.
    #[tokio::test]
    async fn works_as_a_trait_object() {
        let limiter: Arc<dyn RateLimiter> = Arc::new(MemoryRateLimiter::new());
        let org = Uuid::new_v4();

        let first = limiter.check(org, 2).await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);

        limiter.check(org, 2).await.unwrap();
        let third = limiter.check(org, 2).await.unwrap();
        assert!(!third.allowed);
    }
}
