//! Fixed-window rate limiter keyed by client IP, per 4.8.
//!
//! Two independent instances exist in the running gateway: one for
//! `/query/*` endpoints, one for connection lifecycle endpoints. Both
//! share this implementation, parameterized by key prefix, window,
//! and max count.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::redis_client::RedisClient;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RateLimitRecord {
    count: u64,
    reset_time_epoch_ms: i64,
}

/// Outcome of a single rate-limit check, carrying everything the HTTP
/// layer needs to decorate its response headers.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_time_epoch_ms: i64,
    pub retry_after_secs: Option<u64>,
}

pub struct RateLimiter {
    redis: Arc<RedisClient>,
    prefix: &'static str,
    max: u64,
    window_ms: i64,
}

impl RateLimiter {
    pub fn new(redis: Arc<RedisClient>, prefix: &'static str, max: u64, window_ms: i64) -> Self {
        RateLimiter { redis, prefix, max, window_ms }
    }

    /// Check and record one request from `ip` at `now_ms`. On Redis
    /// failure, fails open: the request is allowed and the failure is
    /// logged, never surfaced to the caller as a denial.
    pub async fn check(&self, ip: &str, now_ms: i64) -> RateLimitDecision {
        match self.check_inner(ip, now_ms).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(error = %e, ip, "rate limiter storage failure, failing open");
                RateLimitDecision {
                    allowed: true,
                    limit: self.max,
                    remaining: self.max,
                    reset_time_epoch_ms: now_ms + self.window_ms,
                    retry_after_secs: None,
                }
            }
        }
    }

    async fn check_inner(&self, ip: &str, now_ms: i64) -> crate::error::Result<RateLimitDecision> {
        let key = format!("{}:{}", self.prefix, ip);
        let existing = self.redis.get(&key).await?;
        let record: Option<RateLimitRecord> = existing.and_then(|s| serde_json::from_str(&s).ok());

        let record = match record {
            None => self.start_window(&key, now_ms).await?,
            Some(r) if now_ms > r.reset_time_epoch_ms => self.start_window(&key, now_ms).await?,
            Some(r) if r.count >= self.max => {
                return Ok(RateLimitDecision {
                    allowed: false,
                    limit: self.max,
                    remaining: 0,
                    reset_time_epoch_ms: r.reset_time_epoch_ms,
                    retry_after_secs: Some(retry_after_secs(r.reset_time_epoch_ms, now_ms)),
                });
            }
            Some(r) => self.increment(&key, r, now_ms).await?,
        };

        Ok(RateLimitDecision {
            allowed: true,
            limit: self.max,
            remaining: self.max.saturating_sub(record.count),
            reset_time_epoch_ms: record.reset_time_epoch_ms,
            retry_after_secs: None,
        })
    }

    async fn start_window(&self, key: &str, now_ms: i64) -> crate::error::Result<RateLimitRecord> {
        let record = RateLimitRecord { count: 1, reset_time_epoch_ms: now_ms + self.window_ms };
        let ttl = ttl_secs(record.reset_time_epoch_ms, now_ms);
        self.redis.set_ex(key, &serde_json::to_string(&record)?, ttl).await?;
        Ok(record)
    }

    async fn increment(&self, key: &str, mut record: RateLimitRecord, now_ms: i64) -> crate::error::Result<RateLimitRecord> {
        record.count += 1;
        let ttl = ttl_secs(record.reset_time_epoch_ms, now_ms);
        self.redis.set_ex(key, &serde_json::to_string(&record)?, ttl).await?;
        Ok(record)
    }
}

/// TTL in whole seconds, rounded up, never below 1 even if the window
/// is about to expire.
fn ttl_secs(reset_time_epoch_ms: i64, now_ms: i64) -> u64 {
    let remaining_ms = (reset_time_epoch_ms - now_ms).max(0);
    ((remaining_ms as f64) / 1000.0).ceil().max(1.0) as u64
}

fn retry_after_secs(reset_time_epoch_ms: i64, now_ms: i64) -> u64 {
    ((reset_time_epoch_ms - now_ms).max(0) as u64).div_ceil(1000)
}

/// Extract the client IP per 4.8: `x-forwarded-for` first (the first
/// entry in a comma-separated list), then `x-real-ip`, then `"unknown"`.
pub fn client_ip(forwarded_for: Option<&str>, real_ip: Option<&str>) -> String {
    if let Some(list) = forwarded_for {
        if let Some(first) = list.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    if let Some(ip) = real_ip {
        if !ip.trim().is_empty() {
            return ip.trim().to_string();
        }
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_rounds_up_and_floors_at_one_second() {
        assert_eq!(ttl_secs(1500, 1000), 1);
        assert_eq!(ttl_secs(900, 1000), 1);
        assert_eq!(ttl_secs(3000, 1000), 2);
    }

    #[test]
    fn client_ip_prefers_forwarded_for_first_entry() {
        assert_eq!(client_ip(Some("1.2.3.4, 5.6.7.8"), Some("9.9.9.9")), "1.2.3.4");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip_then_unknown() {
        assert_eq!(client_ip(None, Some("9.9.9.9")), "9.9.9.9");
        assert_eq!(client_ip(None, None), "unknown");
    }

    #[tokio::test]
    async fn check_fails_open_when_redis_is_unreachable() {
        let redis = Arc::new(RedisClient::new(
            "redis://127.0.0.1:1",
            1,
            std::time::Duration::from_millis(1),
        ));
        let limiter = RateLimiter::new(redis, "ratelimit:test", 10, 60_000);
        let decision = limiter.check("1.2.3.4", 0).await;
        assert!(decision.allowed);
        assert_eq!(decision.limit, 10);
    }
}
