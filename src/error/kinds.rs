//! Error types for the query gateway.
//!
//! This module defines a streamlined error hierarchy that wraps driver
//! errors from the three backing engines and maps each variant onto the
//! HTTP status codes named in the specification.

use std::fmt;

/// Crate-wide `Result` type using [`GatewayError`] as the error.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Top-level error type for gateway operations.
///
/// Every variant maps to exactly one of the error kinds described for
/// the HTTP surface: client input, authentication/authorization, rate
/// limiting, validation, execution, and server errors.
#[derive(Debug)]
pub enum GatewayError {
    /// Missing/invalid fields, unsupported kind, malformed connection URL.
    ClientInput(String),

    /// Missing/invalid signature, stale timestamp, unknown session.
    AuthN(String),

    /// Isolation violation, wrong admin token, privileged action denied.
    AuthZ(String),

    /// Rate limit exceeded; carries the number of seconds to retry after.
    RateLimited { message: String, retry_after_secs: u64 },

    /// Length/depth breach, dangerous pattern, dialect parse error.
    Validation(String),

    /// Driver error, already sanitized of credentials.
    Execution(String),

    /// Unexpected server-side failure.
    Server(String),

    /// Feature gated behind configuration that is absent (admin cleanup, session-extend).
    Unconfigured(String),
}

impl GatewayError {
    pub fn client_input(msg: impl Into<String>) -> Self {
        GatewayError::ClientInput(msg.into())
    }

    pub fn auth_n(msg: impl Into<String>) -> Self {
        GatewayError::AuthN(msg.into())
    }

    pub fn auth_z(msg: impl Into<String>) -> Self {
        GatewayError::AuthZ(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        GatewayError::Validation(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        GatewayError::Execution(msg.into())
    }

    pub fn server(msg: impl Into<String>) -> Self {
        GatewayError::Server(msg.into())
    }

    /// HTTP status code this error maps onto.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::ClientInput(_) => 400,
            GatewayError::AuthN(_) => 401,
            GatewayError::AuthZ(_) => 403,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::Validation(_) => 400,
            GatewayError::Execution(_) => 400,
            GatewayError::Server(_) => 500,
            GatewayError::Unconfigured(_) => 503,
        }
    }

    pub fn message(&self) -> String {
        match self {
            GatewayError::ClientInput(m)
            | GatewayError::AuthN(m)
            | GatewayError::AuthZ(m)
            | GatewayError::Validation(m)
            | GatewayError::Execution(m)
            | GatewayError::Server(m)
            | GatewayError::Unconfigured(m) => m.clone(),
            GatewayError::RateLimited { message, .. } => message.clone(),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for GatewayError {}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        GatewayError::Execution(crate::error::sanitize::sanitize_message(&err.to_string()))
    }
}

impl From<mongodb::error::Error> for GatewayError {
    fn from(err: mongodb::error::Error) -> Self {
        GatewayError::Execution(crate::error::sanitize::sanitize_message(&err.to_string()))
    }
}

impl From<redis::RedisError> for GatewayError {
    fn from(err: redis::RedisError) -> Self {
        GatewayError::Server(crate::error::sanitize::sanitize_message(&err.to_string()))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::ClientInput(format!("invalid JSON: {}", err))
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Server(err.to_string())
    }
}

impl From<String> for GatewayError {
    fn from(msg: String) -> Self {
        GatewayError::Server(msg)
    }
}

impl From<&str> for GatewayError {
    fn from(msg: &str) -> Self {
        GatewayError::Server(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec() {
        assert_eq!(GatewayError::client_input("x").status_code(), 400);
        assert_eq!(GatewayError::auth_n("x").status_code(), 401);
        assert_eq!(GatewayError::auth_z("x").status_code(), 403);
        assert_eq!(
            GatewayError::RateLimited { message: "x".into(), retry_after_secs: 1 }.status_code(),
            429
        );
        assert_eq!(GatewayError::validation("x").status_code(), 400);
        assert_eq!(GatewayError::execution("x").status_code(), 400);
        assert_eq!(GatewayError::server("x").status_code(), 500);
        assert_eq!(GatewayError::Unconfigured("x".into()).status_code(), 503);
    }
}
