//! Handler bodies for every endpoint in 6.1.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;

use crate::adapters::{new_adapter, DatabaseKind, QueryOptions};
use crate::app::App;
use crate::error::{GatewayError, Result};
use crate::export;
use crate::ratelimit::{self, RateLimitDecision};
use crate::security::{sanitizer, signing};
use crate::session::SessionSnapshot;

fn success_json(value: Value) -> Response {
    (StatusCode::OK, Json(value)).into_response()
}

fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());
    let real = headers.get("x-real-ip").and_then(|v| v.to_str().ok());
    ratelimit::client_ip(forwarded, real)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn rate_limit(limiter: &ratelimit::RateLimiter, headers: &HeaderMap) -> Result<RateLimitDecision> {
    let ip = client_ip(headers);
    let now_ms = chrono::Utc::now().timestamp_millis();
    let decision = limiter.check(&ip, now_ms).await;
    if !decision.allowed {
        return Err(GatewayError::RateLimited {
            message: "rate limit exceeded".to_string(),
            retry_after_secs: decision.retry_after_secs.unwrap_or(60),
        });
    }
    Ok(decision)
}

fn decorate_rate_limit(mut response: Response, decision: &RateLimitDecision) -> Response {
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("RateLimit-Remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.reset_time_epoch_ms.to_string()) {
        headers.insert("RateLimit-Reset", v);
    }
    headers.insert("RateLimit-Policy", HeaderValue::from_static("fixed-window"));
    response
}

fn query_payload(params: &HashMap<String, String>) -> Value {
    Value::Object(params.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect())
}

fn require_str<'a>(payload: &'a Value, field: &str) -> Result<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::client_input(format!("missing field: {}", field)))
}

async fn authenticate(
    app: &App,
    headers: &HeaderMap,
    session_id: &str,
    payload: &Value,
) -> Result<SessionSnapshot> {
    let snapshot = app.sessions.snapshot(session_id).await?;
    let now_ms = chrono::Utc::now().timestamp_millis();
    signing::verify(
        &snapshot.signing_key_hex,
        header_str(headers, "x-timestamp"),
        header_str(headers, "x-signature"),
        now_ms,
        payload,
    )?;
    Ok(snapshot)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionsTestRequest {
    kind: DatabaseKind,
    connection_url: String,
}

pub async fn connections_test(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(body): Json<ConnectionsTestRequest>,
) -> Result<Response> {
    let decision = rate_limit(&app.connection_limiter, &headers).await?;
    let mut adapter = new_adapter(body.kind, app.config.query_timeout());
    adapter.connect(&body.connection_url).await?;
    let server_version = adapter.get_server_version().await?;
    let _ = adapter.disconnect().await;
    Ok(decorate_rate_limit(success_json(json!({"success": true, "serverVersion": server_version})), &decision))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest {
    kind: DatabaseKind,
    connection_url: Option<String>,
    user_id: Option<String>,
    is_isolated: Option<bool>,
    use_default_database: Option<bool>,
}

pub async fn connections_connect(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(body): Json<ConnectRequest>,
) -> Result<Response> {
    let decision = rate_limit(&app.connection_limiter, &headers).await?;

    let url = if body.use_default_database.unwrap_or(false) {
        app.config
            .default_databases
            .iter()
            .find(|d| d.kind == body.kind)
            .map(|d| d.url.clone())
            .ok_or_else(|| GatewayError::client_input("no default connection is configured for this kind"))?
    } else {
        body.connection_url
            .clone()
            .ok_or_else(|| GatewayError::client_input("connectionUrl is required"))?
    };

    let created = app
        .sessions
        .create_session(body.kind, &url, body.user_id.clone(), body.is_isolated.unwrap_or(false))
        .await?;

    Ok(decorate_rate_limit(
        success_json(json!({
            "success": true,
            "sessionId": created.session_id,
            "serverVersion": created.server_version,
            "signingKey": created.signing_key_hex,
            "userDatabase": created.user_database,
        })),
        &decision,
    ))
}

pub async fn connections_disconnect(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Response> {
    let decision = rate_limit(&app.connection_limiter, &headers).await?;
    let session_id = require_str(&payload, "sessionId")?.to_string();
    authenticate(&app, &headers, &session_id, &payload).await?;
    app.sessions.close_session(&session_id).await;
    Ok(decorate_rate_limit(success_json(json!({"success": true})), &decision))
}

pub async fn connections_keepalive(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Response> {
    let decision = rate_limit(&app.connection_limiter, &headers).await?;
    let session_id = require_str(&payload, "sessionId")?.to_string();
    authenticate(&app, &headers, &session_id, &payload).await?;
    app.sessions.touch(&session_id).await;
    Ok(decorate_rate_limit(success_json(json!({"success": true})), &decision))
}

pub async fn connections_session_extend(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Response> {
    let decision = rate_limit(&app.connection_limiter, &headers).await?;

    let Some(expected_code) = app.config.app_extend_code.clone() else {
        return Ok(decorate_rate_limit(
            (StatusCode::NOT_FOUND, Json(json!({"success": false, "error": "session-extend is not configured"})))
                .into_response(),
            &decision,
        ));
    };

    let session_id = require_str(&payload, "sessionId")?.to_string();
    let snapshot = authenticate(&app, &headers, &session_id, &payload).await?;
    if !snapshot.is_default_connection {
        return Err(GatewayError::auth_z("session-extend only applies to default connections"));
    }

    let provided = header_str(&headers, "x-request-code")
        .ok_or_else(|| GatewayError::auth_z("missing x-request-code header"))?;
    if !constant_time_eq(provided, &expected_code) {
        return Err(GatewayError::auth_z("invalid request code"));
    }

    app.sessions.set_allow_destructive(&session_id, true).await?;
    Ok(decorate_rate_limit(success_json(json!({"success": true})), &decision))
}

pub async fn query_execute(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Response> {
    let decision = rate_limit(&app.query_limiter, &headers).await?;
    let session_id = require_str(&payload, "sessionId")?.to_string();
    let snapshot = authenticate(&app, &headers, &session_id, &payload).await?;

    let query = require_str(&payload, "query")?.to_string();
    let database = payload.get("database").and_then(Value::as_str).map(|s| s.to_string());
    let limit = payload.get("limit").and_then(Value::as_i64);
    let offset = payload.get("offset").and_then(Value::as_i64);
    let explain = payload.get("explain").and_then(Value::as_bool).unwrap_or(false);

    sanitizer::validate(
        &query,
        snapshot.kind,
        snapshot.is_default_connection,
        app.config.max_query_length,
        app.config.max_nested_depth,
    )?;

    let options = QueryOptions {
        limit: limit.or(Some(app.config.query_default_limit)),
        offset,
        explain,
        user_id: snapshot.user_id.clone(),
        is_isolated: snapshot.is_isolated,
        user_database: snapshot.user_database.clone(),
        allow_destructive: snapshot.allow_destructive,
    };

    let database_for_call = database.clone();
    let result = app
        .sessions
        .with_session_mut(&session_id, move |session| {
            Box::pin(async move { session.adapter.execute_query(&query, database_for_call.as_deref(), &options).await })
        })
        .await?;

    Ok(decorate_rate_limit(success_json(json!({"success": true, "result": result})), &decision))
}

pub async fn query_export(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Response> {
    let decision = rate_limit(&app.query_limiter, &headers).await?;
    let session_id = require_str(&payload, "sessionId")?.to_string();
    let snapshot = authenticate(&app, &headers, &session_id, &payload).await?;

    let query = require_str(&payload, "query")?.to_string();
    let database = payload.get("database").and_then(Value::as_str).map(|s| s.to_string());
    let format_str = require_str(&payload, "format")?;
    let format = export::ExportFormat::parse(format_str)
        .ok_or_else(|| GatewayError::client_input("format must be 'csv' or 'json'"))?;

    sanitizer::validate(
        &query,
        snapshot.kind,
        snapshot.is_default_connection,
        app.config.max_query_length,
        app.config.max_nested_depth,
    )?;

    if snapshot.kind == DatabaseKind::Mysql && snapshot.is_isolated {
        let mut allowed: std::collections::HashSet<String> = std::collections::HashSet::new();
        if let Some(db) = &snapshot.user_database {
            allowed.insert(db.clone());
        }
        if let Some(db) = &database {
            allowed.insert(db.clone());
        }
        for referenced in sanitizer::extract_referenced_databases(&query) {
            if !allowed.contains(&referenced) {
                return Err(GatewayError::auth_z(format!(
                    "query references database '{}' outside the isolation boundary",
                    referenced
                )));
            }
        }
    }

    let options = QueryOptions {
        // Export runs without the usual default cap, per 4.10.
        limit: Some(i64::MAX),
        offset: None,
        explain: false,
        user_id: snapshot.user_id.clone(),
        is_isolated: snapshot.is_isolated,
        user_database: snapshot.user_database.clone(),
        allow_destructive: snapshot.allow_destructive,
    };

    let database_for_call = database.clone();
    let result = app
        .sessions
        .with_session_mut(&session_id, move |session| {
            Box::pin(async move { session.adapter.execute_query(&query, database_for_call.as_deref(), &options).await })
        })
        .await?;

    let bytes = export::render(&result, format)?;
    Ok(decorate_rate_limit(
        (StatusCode::OK, [(axum::http::header::CONTENT_TYPE, format.content_type())], bytes).into_response(),
        &decision,
    ))
}

pub async fn transaction(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Response> {
    let decision = rate_limit(&app.connection_limiter, &headers).await?;
    let session_id = require_str(&payload, "sessionId")?.to_string();
    authenticate(&app, &headers, &session_id, &payload).await?;
    let action = require_str(&payload, "action")?.to_string();

    app.sessions
        .with_session_mut(&session_id, move |session| {
            Box::pin(async move {
                match action.as_str() {
                    "begin" => session.adapter.begin_transaction().await,
                    "commit" => session.adapter.commit_transaction().await,
                    "rollback" => session.adapter.rollback_transaction().await,
                    other => Err(GatewayError::client_input(format!("unknown transaction action: {}", other))),
                }
            })
        })
        .await?;

    Ok(decorate_rate_limit(success_json(json!({"success": true})), &decision))
}

pub async fn schema_databases(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let decision = rate_limit(&app.connection_limiter, &headers).await?;
    let payload = query_payload(&params);
    let session_id = params.get("sessionId").cloned().ok_or_else(|| GatewayError::client_input("missing sessionId"))?;
    authenticate(&app, &headers, &session_id, &payload).await?;

    let databases = app
        .sessions
        .with_session_mut(&session_id, |session| Box::pin(async move { session.adapter.get_databases().await }))
        .await?;

    Ok(decorate_rate_limit(success_json(json!({"success": true, "databases": databases})), &decision))
}

pub async fn schema_tables(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let decision = rate_limit(&app.connection_limiter, &headers).await?;
    let payload = query_payload(&params);
    let session_id = params.get("sessionId").cloned().ok_or_else(|| GatewayError::client_input("missing sessionId"))?;
    let database = params.get("database").cloned().ok_or_else(|| GatewayError::client_input("missing database"))?;
    authenticate(&app, &headers, &session_id, &payload).await?;

    let tables = app
        .sessions
        .with_session_mut(&session_id, move |session| {
            Box::pin(async move { session.adapter.get_tables(&database).await })
        })
        .await?;

    Ok(decorate_rate_limit(success_json(json!({"success": true, "tables": tables})), &decision))
}

pub async fn schema_columns(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let decision = rate_limit(&app.connection_limiter, &headers).await?;
    let payload = query_payload(&params);
    let session_id = params.get("sessionId").cloned().ok_or_else(|| GatewayError::client_input("missing sessionId"))?;
    let database = params.get("database").cloned().ok_or_else(|| GatewayError::client_input("missing database"))?;
    let table = params.get("table").cloned().ok_or_else(|| GatewayError::client_input("missing table"))?;
    authenticate(&app, &headers, &session_id, &payload).await?;

    let columns = app
        .sessions
        .with_session_mut(&session_id, move |session| {
            Box::pin(async move { session.adapter.get_columns(&database, &table).await })
        })
        .await?;

    Ok(decorate_rate_limit(success_json(json!({"success": true, "columns": columns})), &decision))
}

pub async fn config_databases(State(app): State<Arc<App>>) -> Response {
    let entries: Vec<Value> = app
        .config
        .default_databases
        .iter()
        .map(|d| json!({"kind": d.kind, "displayName": d.display_name}))
        .collect();
    success_json(json!({"success": true, "databases": entries}))
}

pub async fn admin_cleanup(State(app): State<Arc<App>>, headers: HeaderMap) -> Result<Response> {
    let decision = rate_limit(&app.connection_limiter, &headers).await?;

    let Some(expected_token) = app.config.admin_cleanup_token.clone() else {
        return Ok(decorate_rate_limit(
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"success": false, "error": "admin cleanup is not configured"})))
                .into_response(),
            &decision,
        ));
    };

    let provided = header_str(&headers, "x-admin-token").unwrap_or("");
    if !constant_time_eq(provided, &expected_token) {
        return Err(GatewayError::auth_n("invalid admin token"));
    }

    crate::scheduler::run_cleanup_once(&app.config).await;
    Ok(decorate_rate_limit(success_json(json!({"success": true})), &decision))
}
