//! Lazy-connected Redis client with bounded retry, backing the rate
//! limiter's fixed-window counters.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::error::Result;

/// Wraps a [`ConnectionManager`] behind a lazily-initialized,
/// retry-bounded connect so the gateway can start before Redis is
/// reachable and reconnect transparently afterward.
pub struct RedisClient {
    url: String,
    retry_attempts: u32,
    retry_delay: Duration,
    connection: Mutex<Option<ConnectionManager>>,
}

impl RedisClient {
    pub fn new(url: impl Into<String>, retry_attempts: u32, retry_delay: Duration) -> Self {
        RedisClient { url: url.into(), retry_attempts, retry_delay, connection: Mutex::new(None) }
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let mut last_error = None;
        for attempt in 0..self.retry_attempts.max(1) {
            match self.connect_once().await {
                Ok(conn) => {
                    *guard = Some(conn.clone());
                    return Ok(conn);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "redis connect attempt failed");
                    last_error = Some(e);
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
        Err(last_error.unwrap_or_else(|| crate::error::GatewayError::server("redis connect failed")))
    }

    async fn connect_once(&self) -> Result<ConnectionManager> {
        let client = redis::Client::open(self.url.as_str())?;
        let manager = client.get_connection_manager().await?;
        Ok(manager)
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.get(key).await?)
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Spawn a background task that pings Redis on a fixed interval, the
/// same "driver health ping" idiom used for the SQL/Mongo adapters'
/// `health_check`, applied here to the rate limiter's own backing
/// store. Failures are logged, never fatal — the limiter already fails
/// open on storage errors.
pub fn spawn_health_ping(redis: Arc<RedisClient>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = redis.ping().await {
                tracing::warn!(error = %e, "redis health ping failed");
            }
        }
    });
}
