//! Per-(tier, identifier) token-bucket rate limiting.
//!
//! Buckets refill continuously at capacity/window and are created full on
//! first sight. A denied check appends a violation record; violations are
//! retained for one hour. `check_limit` never fails; it always returns a
//! decision.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;

/// One hour, in milliseconds.
const WINDOW_MS: i64 = 3_600_000;
/// Violations older than this are pruned on access.
const VIOLATION_RETENTION_MS: i64 = 3_600_000;
/// Buckets untouched for this long are reclaimed by housekeeping.
const BUCKET_IDLE_MS: i64 = 2 * WINDOW_MS;

/// Admission class with a fixed per-window budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Anonymous,
    Authenticated,
    Premium,
}

impl Tier {
    pub fn capacity(&self) -> u64 {
        match self {
            Self::Anonymous => 100,
            Self::Authenticated => 1_000,
            Self::Premium => 10_000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Authenticated => "authenticated",
            Self::Premium => "premium",
        }
    }

    /// Refill rate in tokens per millisecond.
    fn refill_rate(&self) -> f64 {
        self.capacity() as f64 / WINDOW_MS as f64
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    /// Tokens per millisecond.
    refill_rate: f64,
    /// Unix milliseconds of the last refill.
    last_refill_ms: i64,
}

impl Bucket {
    fn new(tier: Tier, now_ms: i64) -> Self {
        Self {
            tokens: tier.capacity() as f64,
            capacity: tier.capacity() as f64,
            refill_rate: tier.refill_rate(),
            last_refill_ms: now_ms,
        }
    }

    fn refill(&mut self, now_ms: i64) {
        let elapsed = (now_ms - self.last_refill_ms).max(0) as f64;
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill_ms = now_ms;
    }

    /// Unix second at which the bucket will be full again.
    fn reset_secs(&self) -> i64 {
        let to_full_ms = (self.capacity - self.tokens) / self.refill_rate;
        ((self.last_refill_ms as f64 + to_full_ms) / 1000.0).ceil() as i64
    }

    /// Seconds until one more token is available.
    fn retry_after_secs(&self) -> u64 {
        ((1.0 / self.refill_rate) / 1000.0).ceil() as u64
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
    /// Unix seconds at which the bucket is full again.
    pub reset: i64,
    pub limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub identifier: String,
    pub tier: Tier,
    /// Unix milliseconds of the denial.
    pub timestamp: i64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub allowed: u64,
    pub blocked: u64,
    pub violations: u64,
    pub active_buckets: usize,
    pub recent_violations: usize,
    /// Percent of checks that were denied; 0 when no checks were made.
    pub block_rate: f64,
}

pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    violations: Mutex<Vec<Violation>>,
    total_requests: AtomicU64,
    allowed: AtomicU64,
    blocked: AtomicU64,
    violation_count: AtomicU64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            violations: Mutex::new(Vec::new()),
            total_requests: AtomicU64::new(0),
            allowed: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            violation_count: AtomicU64::new(0),
        }
    }

    fn bucket_key(tier: Tier, identifier: &str) -> String {
        format!("{}:{}", tier.as_str(), identifier)
    }

    /// Refill the bucket, consume one token when available, and return the
    /// decision. Denials are recorded as violations.
    pub fn check_limit(&self, identifier: &str, tier: Tier) -> RateLimitDecision {
        self.check_at(identifier, tier, Utc::now().timestamp_millis())
    }

    fn check_at(&self, identifier: &str, tier: Tier, now_ms: i64) -> RateLimitDecision {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let key = Self::bucket_key(tier, identifier);
        // the entry guard gives exclusive access while we refill + consume
        let mut bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| Bucket::new(tier, now_ms));
        bucket.refill(now_ms);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            self.allowed.fetch_add(1, Ordering::Relaxed);
            return RateLimitDecision {
                allowed: true,
                remaining: bucket.tokens.floor() as u64,
                reset: bucket.reset_secs(),
                limit: tier.capacity(),
                retry_after: None,
            };
        }

        let decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset: bucket.reset_secs(),
            limit: tier.capacity(),
            retry_after: Some(bucket.retry_after_secs()),
        };
        drop(bucket);

        self.blocked.fetch_add(1, Ordering::Relaxed);
        self.violation_count.fetch_add(1, Ordering::Relaxed);
        self.push_violation(identifier, tier, now_ms);
        tracing::warn!(
            "rate limit exceeded for {} (tier {}), retry after {}s",
            identifier,
            tier.as_str(),
            decision.retry_after.unwrap_or(0)
        );
        decision
    }

    /// Same computation as [`check_limit`] but without consuming a token or
    /// mutating the bucket.
    pub fn get_status(&self, identifier: &str, tier: Tier) -> RateLimitDecision {
        self.status_at(identifier, tier, Utc::now().timestamp_millis())
    }

    fn status_at(&self, identifier: &str, tier: Tier, now_ms: i64) -> RateLimitDecision {
        let key = Self::bucket_key(tier, identifier);
        let (tokens, reset) = match self.buckets.get(&key) {
            Some(bucket) => {
                let elapsed = (now_ms - bucket.last_refill_ms).max(0) as f64;
                let tokens = (bucket.tokens + elapsed * bucket.refill_rate).min(bucket.capacity);
                let probe = Bucket {
                    tokens,
                    capacity: bucket.capacity,
                    refill_rate: bucket.refill_rate,
                    last_refill_ms: now_ms,
                };
                (tokens, probe.reset_secs())
            }
            None => (tier.capacity() as f64, (now_ms as f64 / 1000.0).ceil() as i64),
        };

        RateLimitDecision {
            allowed: tokens >= 1.0,
            remaining: tokens.floor() as u64,
            reset,
            limit: tier.capacity(),
            retry_after: if tokens >= 1.0 {
                None
            } else {
                Some(((WINDOW_MS as f64 / tier.capacity() as f64) / 1000.0).ceil() as u64)
            },
        }
    }

    pub fn reset(&self, identifier: &str, tier: Tier) -> bool {
        self.buckets
            .remove(&Self::bucket_key(tier, identifier))
            .is_some()
    }

    pub fn reset_all(&self) {
        let count = self.buckets.len();
        self.buckets.clear();
        tracing::debug!("cleared all {} rate-limit bucket(s)", count);
    }

    pub fn stats(&self) -> RateLimiterStats {
        let total = self.total_requests.load(Ordering::Relaxed);
        let blocked = self.blocked.load(Ordering::Relaxed);
        RateLimiterStats {
            total_requests: total,
            allowed: self.allowed.load(Ordering::Relaxed),
            blocked,
            violations: self.violation_count.load(Ordering::Relaxed),
            active_buckets: self.buckets.len(),
            recent_violations: self.get_violations(None).len(),
            block_rate: if total == 0 {
                0.0
            } else {
                blocked as f64 / total as f64 * 100.0
            },
        }
    }

    /// Violations from the last hour, optionally filtered by identifier.
    pub fn get_violations(&self, identifier: Option<&str>) -> Vec<Violation> {
        self.violations_at(identifier, Utc::now().timestamp_millis())
    }

    fn violations_at(&self, identifier: Option<&str>, now_ms: i64) -> Vec<Violation> {
        let mut log = self.lock_violations();
        log.retain(|v| now_ms - v.timestamp < VIOLATION_RETENTION_MS);
        log.iter()
            .filter(|v| identifier.map(|id| v.identifier == id).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn reset_stats(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.allowed.store(0, Ordering::Relaxed);
        self.blocked.store(0, Ordering::Relaxed);
        self.violation_count.store(0, Ordering::Relaxed);
        self.lock_violations().clear();
    }

    /// Remove buckets whose last refill is older than twice the window.
    /// A concurrent check may resurrect a reclaimed bucket; it comes back
    /// full, which is the same state a brand-new bucket would have.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_at(Utc::now().timestamp_millis())
    }

    fn cleanup_at(&self, now_ms: i64) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now_ms - bucket.last_refill_ms < BUCKET_IDLE_MS);
        let removed = before - self.buckets.len();
        if removed > 0 {
            tracing::debug!("reclaimed {} idle rate-limit bucket(s)", removed);
        }
        removed
    }

    fn push_violation(&self, identifier: &str, tier: Tier, now_ms: i64) {
        let mut log = self.lock_violations();
        log.retain(|v| now_ms - v.timestamp < VIOLATION_RETENTION_MS);
        log.push(Violation {
            identifier: identifier.to_string(),
            tier,
            timestamp: now_ms,
            limit: tier.capacity(),
        });
    }

    fn lock_violations(&self) -> std::sync::MutexGuard<'_, Vec<Violation>> {
        match self.violations.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn test_new_bucket_starts_full() {
        let limiter = RateLimiter::new();
        let decision = limiter.check_at("client", Tier::Anonymous, T0);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 99);
        assert_eq!(decision.limit, 100);
        assert!(decision.retry_after.is_none());
    }

    #[test]
    fn test_capacity_exhaustion() {
        let limiter = RateLimiter::new();
        for i in 0..100 {
            let decision = limiter.check_at("client", Tier::Anonymous, T0);
            assert!(decision.allowed, "request {} should pass", i + 1);
        }
        let denied = limiter.check_at("client", Tier::Anonymous, T0);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        // anonymous refills one token per 36 s
        assert_eq!(denied.retry_after, Some(36));
    }

    #[test]
    fn test_denied_until_refill() {
        let limiter = RateLimiter::new();
        for _ in 0..100 {
            limiter.check_at("client", Tier::Anonymous, T0);
        }
        // one second short of a whole token: still denied
        let early = limiter.check_at("client", Tier::Anonymous, T0 + 35_000);
        assert!(!early.allowed);
        // comfortably past the refill point: allowed again
        let later = limiter.check_at("client", Tier::Anonymous, T0 + 37_000 + 35_000);
        assert!(later.allowed);
    }

    #[test]
    fn test_conservation_over_window() {
        let limiter = RateLimiter::new();
        let mut granted = 0;
        for _ in 0..150 {
            if limiter.check_at("client", Tier::Anonymous, T0).allowed {
                granted += 1;
            }
        }
        // no time passes, so exactly the capacity is granted
        assert_eq!(granted, 100);
    }

    #[test]
    fn test_buckets_are_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..100 {
            limiter.check_at("a", Tier::Anonymous, T0);
        }
        assert!(!limiter.check_at("a", Tier::Anonymous, T0).allowed);
        assert!(limiter.check_at("b", Tier::Anonymous, T0).allowed);
        // same identifier, different tier is a different bucket
        assert!(limiter.check_at("a", Tier::Authenticated, T0).allowed);
    }

    #[test]
    fn test_status_does_not_consume() {
        let limiter = RateLimiter::new();
        limiter.check_at("client", Tier::Premium, T0);
        let before = limiter.status_at("client", Tier::Premium, T0);
        let after = limiter.status_at("client", Tier::Premium, T0);
        assert_eq!(before.remaining, after.remaining);
        assert_eq!(before.remaining, 9_999);
    }

    #[test]
    fn test_status_of_unknown_bucket() {
        let limiter = RateLimiter::new();
        let status = limiter.status_at("ghost", Tier::Anonymous, T0);
        assert!(status.allowed);
        assert_eq!(status.remaining, 100);
    }

    #[test]
    fn test_reset_refills_bucket() {
        let limiter = RateLimiter::new();
        for _ in 0..100 {
            limiter.check_at("client", Tier::Anonymous, T0);
        }
        assert!(limiter.reset("client", Tier::Anonymous));
        assert!(limiter.check_at("client", Tier::Anonymous, T0).allowed);
    }

    #[test]
    fn test_violations_recorded_and_filtered() {
        let limiter = RateLimiter::new();
        for _ in 0..101 {
            limiter.check_at("a", Tier::Anonymous, T0);
        }
        for _ in 0..101 {
            limiter.check_at("b", Tier::Anonymous, T0);
        }
        assert_eq!(limiter.violations_at(None, T0).len(), 2);
        let only_a = limiter.violations_at(Some("a"), T0);
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].identifier, "a");
        assert_eq!(only_a[0].limit, 100);
    }

    #[test]
    fn test_violation_retention_one_hour() {
        let limiter = RateLimiter::new();
        for _ in 0..101 {
            limiter.check_at("a", Tier::Anonymous, T0);
        }
        assert_eq!(limiter.violations_at(None, T0 + 10_000).len(), 1);
        assert_eq!(
            limiter.violations_at(None, T0 + VIOLATION_RETENTION_MS + 1).len(),
            0
        );
    }

    #[test]
    fn test_stats_and_block_rate() {
        let limiter = RateLimiter::new();
        for _ in 0..101 {
            limiter.check_at("a", Tier::Anonymous, T0);
        }
        let stats = limiter.stats();
        assert_eq!(stats.total_requests, 101);
        assert_eq!(stats.allowed, 100);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.violations, 1);
        assert_eq!(stats.active_buckets, 1);
        assert!((stats.block_rate - 100.0 / 101.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_stats_zeroes_counters() {
        let limiter = RateLimiter::new();
        for _ in 0..101 {
            limiter.check_at("a", Tier::Anonymous, T0);
        }
        limiter.reset_stats();
        let stats = limiter.stats();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.allowed, 0);
        assert_eq!(stats.blocked, 0);
        assert_eq!(stats.violations, 0);
        assert_eq!(stats.recent_violations, 0);
        assert_eq!(stats.block_rate, 0.0);
    }

    #[test]
    fn test_housekeeping_reclaims_idle_buckets() {
        let limiter = RateLimiter::new();
        limiter.check_at("idle", Tier::Anonymous, T0);
        limiter.check_at("busy", Tier::Anonymous, T0);
        limiter.check_at("busy", Tier::Anonymous, T0 + BUCKET_IDLE_MS);

        let removed = limiter.cleanup_at(T0 + BUCKET_IDLE_MS + 1);
        assert_eq!(removed, 1);
        assert_eq!(limiter.stats().active_buckets, 1);
        // reclaimed bucket resurrects full on next check
        assert!(limiter.check_at("idle", Tier::Anonymous, T0 + BUCKET_IDLE_MS + 2).allowed);
    }
}
