//! Configuration management for the query gateway.
//!
//! Configuration is sourced entirely from the process environment (there
//! is no server-side config file or CLI override layer — the gateway is
//! a long-running service, not an interactive shell). Every variable
//! here corresponds to one named in the specification's environment
//! section, with the same defaults.

use std::collections::HashMap;
use std::time::Duration;

use crate::adapters::DatabaseKind;
use crate::error::{GatewayError, Result};

/// Main configuration structure, built once at process boot.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub default_databases: Vec<DefaultDatabaseConfig>,
    pub query_timeout_ms: u64,
    pub query_default_limit: i64,
    pub mongo_schema_sample_size: i64,
    pub rate_limit_query_max: u32,
    pub rate_limit_connection_max: u32,
    pub session_timeout_ms: u64,
    pub max_query_length: usize,
    pub max_nested_depth: usize,
    pub redis_retry_attempts: u32,
    pub redis_retry_delay_ms: u64,
    pub admin_cleanup_token: Option<String>,
    pub app_extend_code: Option<String>,
}

/// Immutable, process-wide record of a configured "default" connection.
/// The URL is carried in-process only; it is never serialized onto the wire.
#[derive(Debug, Clone)]
pub struct DefaultDatabaseConfig {
    pub kind: DatabaseKind,
    pub url: String,
    pub display_name: String,
}

impl Config {
    /// Build configuration from environment variables, applying the
    /// documented defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let get = |k: &str| vars.get(k).cloned();

        let redis_url = get("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string());

        let mut default_databases = Vec::new();
        for (kind, env_prefix) in [
            (DatabaseKind::Mongodb, "MONGODB"),
            (DatabaseKind::Postgresql, "POSTGRESQL"),
            (DatabaseKind::Mysql, "MYSQL"),
        ] {
            if let Some(url) = get(&format!("DB_{}_URL", env_prefix)) {
                let display_name = get(&format!("DB_{}_NAME", env_prefix))
                    .unwrap_or_else(|| kind.as_str().to_string());
                default_databases.push(DefaultDatabaseConfig { kind, url, display_name });
            }
        }

        let parse_or = |k: &str, default: u64| -> Result<u64> {
            match get(k) {
                Some(v) => v
                    .parse()
                    .map_err(|_| GatewayError::server(format!("invalid {}", k))),
                None => Ok(default),
            }
        };
        let parse_i64_or = |k: &str, default: i64| -> Result<i64> {
            match get(k) {
                Some(v) => v
                    .parse()
                    .map_err(|_| GatewayError::server(format!("invalid {}", k))),
                None => Ok(default),
            }
        };
        let parse_u32_or = |k: &str, default: u32| -> Result<u32> {
            match get(k) {
                Some(v) => v
                    .parse()
                    .map_err(|_| GatewayError::server(format!("invalid {}", k))),
                None => Ok(default),
            }
        };

        let config = Config {
            redis_url,
            default_databases,
            query_timeout_ms: parse_or("QUERY_TIMEOUT_MS", 30_000)?,
            query_default_limit: parse_i64_or("QUERY_DEFAULT_LIMIT", 1_000)?,
            mongo_schema_sample_size: parse_i64_or("MONGO_SCHEMA_SAMPLE_SIZE", 100)?,
            rate_limit_query_max: parse_u32_or("RATE_LIMIT_QUERY_MAX", 100)?,
            rate_limit_connection_max: parse_u32_or("RATE_LIMIT_CONNECTION_MAX", 20)?,
            session_timeout_ms: parse_or("SESSION_TIMEOUT_MS", 30 * 60 * 1000)?,
            max_query_length: parse_or("MAX_QUERY_LENGTH", 100_000)? as usize,
            max_nested_depth: parse_or("MAX_NESTED_DEPTH", 10)? as usize,
            redis_retry_attempts: parse_u32_or("REDIS_RETRY_ATTEMPTS", 3)?,
            redis_retry_delay_ms: parse_or("REDIS_RETRY_DELAY_MS", 1_000)?,
            admin_cleanup_token: get("ADMIN_CLEANUP_TOKEN"),
            app_extend_code: get("APP_EXTEND_CODE"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    /// Look up a default connection config by the URL a session was
    /// opened with.
    pub fn default_for_url(&self, url: &str) -> Option<&DefaultDatabaseConfig> {
        self.default_databases.iter().find(|d| d.url == url)
    }

    fn validate(&self) -> Result<()> {
        for (label, secret) in [
            ("ADMIN_CLEANUP_TOKEN", &self.admin_cleanup_token),
            ("APP_EXTEND_CODE", &self.app_extend_code),
        ] {
            if let Some(s) = secret {
                if s.len() < 8 {
                    return Err(GatewayError::server(format!(
                        "{} must be at least 8 characters when set",
                        label
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            redis_url: "redis://localhost:6379".to_string(),
            default_databases: Vec::new(),
            query_timeout_ms: 30_000,
            query_default_limit: 1_000,
            mongo_schema_sample_size: 100,
            rate_limit_query_max: 100,
            rate_limit_connection_max: 20,
            session_timeout_ms: 30 * 60 * 1000,
            max_query_length: 100_000,
            max_nested_depth: 10,
            redis_retry_attempts: 3,
            redis_retry_delay_ms: 1_000,
            admin_cleanup_token: None,
            app_extend_code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.query_timeout_ms, 30_000);
        assert_eq!(config.query_default_limit, 1_000);
        assert_eq!(config.rate_limit_query_max, 100);
        assert_eq!(config.rate_limit_connection_max, 20);
        assert_eq!(config.max_query_length, 100_000);
        assert_eq!(config.max_nested_depth, 10);
    }

    #[test]
    fn rejects_short_secrets() {
        let mut config = Config::default();
        config.admin_cleanup_token = Some("short".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_long_enough_secrets() {
        let mut config = Config::default();
        config.admin_cleanup_token = Some("longenoughtoken".to_string());
        assert!(config.validate().is_ok());
    }
}
