//! Dependency-injected application container.
//!
//! Wires `Config`, the session registry, the Redis client, both rate
//! limiters, and the background scheduler into a single `Arc`-shared
//! value handed to every axum handler as state.

use std::sync::Arc;

use crate::config::Config;
use crate::ratelimit::RateLimiter;
use crate::redis_client::RedisClient;
use crate::scheduler;
use crate::session::{self, SessionManager};

#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub redis: Arc<RedisClient>,
    pub query_limiter: Arc<RateLimiter>,
    pub connection_limiter: Arc<RateLimiter>,
}

impl App {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let redis = Arc::new(RedisClient::new(
            config.redis_url.clone(),
            config.redis_retry_attempts,
            std::time::Duration::from_millis(config.redis_retry_delay_ms),
        ));
        let query_limiter = Arc::new(RateLimiter::new(
            redis.clone(),
            "ratelimit:query",
            config.rate_limit_query_max as u64,
            60_000,
        ));
        let connection_limiter = Arc::new(RateLimiter::new(
            redis.clone(),
            "ratelimit:connection",
            config.rate_limit_connection_max as u64,
            60_000,
        ));
        let sessions = Arc::new(SessionManager::new(config.clone()));

        App { config, sessions, redis, query_limiter, connection_limiter }
    }

    /// Start the background idle-eviction sweep and the daily cleanup
    /// scheduler. Called once from `main`.
    pub fn spawn_background_tasks(&self) {
        session::spawn_idle_eviction(self.sessions.clone(), std::time::Duration::from_secs(120));
        scheduler::spawn_daily_cleanup(self.config.clone());
        crate::redis_client::spawn_health_ping(self.redis.clone(), std::time::Duration::from_secs(60));
    }
}
