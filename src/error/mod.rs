//! Error handling for the query gateway.
//!
//! This module provides the unified [`GatewayError`] hierarchy used
//! throughout the crate, along with the HTTP status mapping and message
//! sanitization described in the specification's error handling design.

pub mod kinds;
pub mod sanitize;

pub use kinds::{GatewayError, Result};

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(json!({ "success": false, "error": self.message() })))
            .into_response();
        if let GatewayError::RateLimited { retry_after_secs, .. } = &self {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}
