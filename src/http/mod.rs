//! HTTP surface: router construction, security response headers, and
//! the per-route rate-limit middleware. Handler bodies live in
//! [`handlers`].

mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::app::App;

const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn router(app: App) -> Router {
    Router::new()
        .route("/connections/test", post(handlers::connections_test))
        .route("/connections/connect", post(handlers::connections_connect))
        .route("/connections/disconnect", post(handlers::connections_disconnect))
        .route("/connections/keepalive", post(handlers::connections_keepalive))
        .route("/connections/session-extend", post(handlers::connections_session_extend))
        .route("/query/execute", post(handlers::query_execute))
        .route("/query/export", post(handlers::query_export))
        .route("/transaction", post(handlers::transaction))
        .route("/schema/databases", get(handlers::schema_databases))
        .route("/schema/tables", get(handlers::schema_tables))
        .route("/schema/columns", get(handlers::schema_columns))
        .route("/config/databases", get(handlers::config_databases))
        .route("/admin/cleanup", post(handlers::admin_cleanup))
        // Security response headers named in 6.1. Not part of the core
        // contract but carried on every response the way the pack's axum
        // services apply a blanket `tower_http` header layer.
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'self'; frame-ancestors 'none'"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=63072000; includeSubDomains"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(Arc::new(app))
}
