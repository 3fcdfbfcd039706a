//! PostgreSQL adapter: a pooled `sqlx` connection with destructive-op
//! simulation, pagination/EXPLAIN rewriting, schema introspection, and
//! single-owner transaction handling.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};

use crate::adapters::{
    Adapter, ColumnEntry, ColumnInfo, DatabaseEntry, QueryOptions, QueryResult, TableEntry,
};
use crate::error::{GatewayError, Result};
use crate::security::sanitizer;
use crate::sql;

const POOL_MAX_CONNECTIONS: u32 = 5;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());
static SYSTEM_SCHEMAS: &[&str] = &["pg_catalog", "information_schema", "pg_toast"];
static SYSTEM_DATABASES: &[&str] = &["postgres", "template0", "template1"];

pub struct PostgresAdapter {
    pool: Option<PgPool>,
    url: Option<String>,
    transaction: Option<sqlx::Transaction<'static, sqlx::Postgres>>,
    statement_timeout_ms: i64,
}

impl PostgresAdapter {
    pub fn new(query_timeout: Duration) -> Self {
        PostgresAdapter {
            pool: None,
            url: None,
            transaction: None,
            statement_timeout_ms: query_timeout.as_millis() as i64,
        }
    }

    fn pool(&self) -> Result<&PgPool> {
        self.pool.as_ref().ok_or_else(|| GatewayError::execution("not connected"))
    }

    async fn set_statement_timeout(&self) -> Result<()> {
        sqlx::query(&format!("SET statement_timeout = {}", self.statement_timeout_ms))
            .execute(self.pool()?)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Adapter for PostgresAdapter {
    async fn connect(&mut self, url: &str) -> Result<()> {
        let pool = PgPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .idle_timeout(POOL_IDLE_TIMEOUT)
            .acquire_timeout(POOL_CONNECT_TIMEOUT)
            .connect(url)
            .await?;
        self.pool = Some(pool);
        self.url = Some(url.to_string());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(tx) = self.transaction.take() {
            let _ = tx.rollback().await;
        }
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool.as_ref().map(|p| !p.is_closed()).unwrap_or(false)
    }

    async fn execute_query(
        &mut self,
        query: &str,
        database: Option<&str>,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let started = Instant::now();

        if !options.allow_destructive {
            if let Some(op) = sanitizer::classify_destructive_sql(query) {
                return Ok(QueryResult::simulated(op, &format!("{} simulated; no changes were made", op)));
            }
        }

        if let Some(db) = database {
            if !IDENTIFIER.is_match(db) {
                return Err(GatewayError::client_input("invalid schema name"));
            }
            let stmt = format!("SET search_path TO \"{}\", public", db);
            sqlx::query(&stmt).execute(self.pool()?).await?;
        }
        self.set_statement_timeout().await?;

        let rewritten = if options.explain && sql::is_select_like(query) {
            sql::to_explain(query, crate::adapters::DatabaseKind::Postgresql)
        } else {
            sql::pagination::paginate(
                query,
                options.limit,
                options.offset,
                options.limit.unwrap_or(1000),
            )
        };

        if !sql::is_select_like(&rewritten) {
            let affected = if self.transaction.is_some() {
                let tx = self.transaction.as_mut().expect("checked above");
                sqlx::query(&rewritten).execute(&mut **tx).await?.rows_affected()
            } else {
                sqlx::query(&rewritten).execute(self.pool()?).await?.rows_affected()
            };
            // Postgres has no driver-level "last insert id"; a caller that
            // needs the new row's key writes `RETURNING` and takes the
            // row-producing path below instead.
            return Ok(QueryResult::affected(affected, None, started.elapsed().as_millis() as u64));
        }

        let rows: Vec<PgRow> = if self.transaction.is_some() {
            let tx = self.transaction.as_mut().expect("checked above");
            sqlx::query(&rewritten).fetch_all(&mut **tx).await?
        } else {
            sqlx::query(&rewritten).fetch_all(self.pool()?).await?
        };

        let elapsed = started.elapsed().as_millis() as u64;
        let columns = row_columns(&rows);
        let out_rows = rows.iter().map(pg_row_to_map).collect();

        Ok(QueryResult { rows: out_rows, columns, row_count: rows.len(), execution_time_ms: elapsed })
    }

    async fn get_databases(&mut self) -> Result<Vec<DatabaseEntry>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT schema_name FROM information_schema.schemata ORDER BY schema_name")
                .fetch_all(self.pool()?)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(name,)| name)
            .filter(|n| !SYSTEM_SCHEMAS.contains(&n.as_str()))
            .map(|name| DatabaseEntry { name })
            .collect())
    }

    async fn get_tables(&mut self, database: &str) -> Result<Vec<TableEntry>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT table_name, table_type FROM information_schema.tables WHERE table_schema = $1 ORDER BY table_name",
        )
        .bind(database)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, kind)| TableEntry {
                name,
                kind: if kind.eq_ignore_ascii_case("view") { "view".to_string() } else { "table".to_string() },
            })
            .collect())
    }

    async fn get_columns(&mut self, database: &str, object: &str) -> Result<Vec<ColumnEntry>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
        )
        .bind(database)
        .bind(object)
        .fetch_all(self.pool()?)
        .await?;

        let primary_keys: Vec<String> = sqlx::query_scalar(
            "SELECT a.attname FROM pg_index i \
             JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
             WHERE i.indrelid = ($1 || '.' || $2)::regclass AND i.indisprimary",
        )
        .bind(database)
        .bind(object)
        .fetch_all(self.pool()?)
        .await
        .unwrap_or_default();

        Ok(rows
            .into_iter()
            .map(|(name, type_name, nullable)| {
                let primary_key = primary_keys.contains(&name);
                ColumnEntry { primary_key, name, type_name, nullable: nullable == "YES" }
            })
            .collect())
    }

    async fn get_server_version(&mut self) -> Result<String> {
        let (version,): (String,) = sqlx::query_as("SHOW server_version").fetch_one(self.pool()?).await?;
        Ok(version)
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(GatewayError::execution("a transaction is already active"));
        }
        let pool = self.pool()?.clone();
        self.transaction = Some(pool.begin().await?);
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        match self.transaction.take() {
            Some(tx) => Ok(tx.commit().await?),
            None => Err(GatewayError::execution("no active transaction")),
        }
    }

    async fn rollback_transaction(&mut self) -> Result<()> {
        match self.transaction.take() {
            Some(tx) => Ok(tx.rollback().await?),
            None => Err(GatewayError::execution("no active transaction")),
        }
    }

    fn is_transaction_active(&self) -> bool {
        self.transaction.is_some()
    }

    async fn health_check(&mut self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool()?).await?;
        Ok(())
    }

    async fn cleanup_database(&mut self, database: &str) -> Result<()> {
        if !IDENTIFIER.is_match(database) {
            return Err(GatewayError::client_input("invalid database name"));
        }
        terminate_connections(self.pool()?, database).await;
        let stmt = format!("DROP DATABASE IF EXISTS \"{}\"", database);
        sqlx::query(&stmt).execute(self.pool()?).await?;
        Ok(())
    }

    async fn drop_all_user_databases(&mut self) -> Result<()> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT datname FROM pg_database WHERE datistemplate = false")
            .fetch_all(self.pool()?)
            .await?;
        for (name,) in rows {
            if SYSTEM_DATABASES.contains(&name.as_str()) || !name.starts_with("u_") {
                continue;
            }
            if let Err(e) = self.cleanup_database(&name).await {
                tracing::warn!(database = %name, error = %e, "failed to drop user database");
            }
        }
        Ok(())
    }
}

async fn terminate_connections(pool: &PgPool, database: &str) {
    let stmt = "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = $1 AND pid <> pg_backend_pid()";
    if let Err(e) = sqlx::query(stmt).bind(database).execute(pool).await {
        tracing::warn!(database = %database, error = %e, "failed to terminate connections before drop");
    }
}

fn row_columns(rows: &[PgRow]) -> Vec<ColumnInfo> {
    let Some(first) = rows.first() else { return Vec::new() };
    first
        .columns()
        .iter()
        .map(|c| ColumnInfo { name: c.name().to_string(), type_name: pg_type_name(c.type_info().name()) })
        .collect()
}

/// Translate Postgres type names to the human-readable names the
/// schema/result surfaces use. Unknown types pass through as
/// `unknown(<name>)` rather than failing the request.
fn pg_type_name(name: &str) -> String {
    match name.to_ascii_uppercase().as_str() {
        "INT2" | "INT4" | "INT8" => "integer".to_string(),
        "FLOAT4" | "FLOAT8" | "NUMERIC" => "number".to_string(),
        "BOOL" => "boolean".to_string(),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => "string".to_string(),
        "TIMESTAMP" | "TIMESTAMPTZ" | "DATE" | "TIME" => "datetime".to_string(),
        "JSON" | "JSONB" => "json".to_string(),
        "UUID" => "uuid".to_string(),
        "BYTEA" => "binary".to_string(),
        other => format!("unknown({})", other.to_ascii_lowercase()),
    }
}

fn pg_row_to_map(row: &PgRow) -> BTreeMap<String, serde_json::Value> {
    let mut map = BTreeMap::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = pg_value_to_json(row, i, column.type_info().name());
        map.insert(column.name().to_string(), value);
    }
    map
}

fn pg_value_to_json(row: &PgRow, idx: usize, type_name: &str) -> serde_json::Value {
    match type_name.to_ascii_uppercase().as_str() {
        "INT2" => row.try_get::<i16, _>(idx).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
        "INT4" => row.try_get::<i32, _>(idx).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
        "INT8" => row.try_get::<i64, _>(idx).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
        "FLOAT4" => row.try_get::<f32, _>(idx).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
        "FLOAT8" | "NUMERIC" => {
            row.try_get::<f64, _>(idx).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null)
        }
        "BOOL" => row.try_get::<bool, _>(idx).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
        "TIMESTAMP" | "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
            .map(|v| serde_json::json!(v.to_rfc3339()))
            .unwrap_or(serde_json::Value::Null),
        "JSON" | "JSONB" => {
            row.try_get::<serde_json::Value, _>(idx).unwrap_or(serde_json::Value::Null)
        }
        _ => row.try_get::<String, _>(idx).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pg_type_name_maps_known_types() {
        assert_eq!(pg_type_name("int4"), "integer");
        assert_eq!(pg_type_name("bool"), "boolean");
        assert_eq!(pg_type_name("jsonb"), "json");
    }

    #[test]
    fn pg_type_name_falls_back_for_unknown_types() {
        assert_eq!(pg_type_name("tsvector"), "unknown(tsvector)");
    }

    #[test]
    fn identifier_regex_rejects_injection_attempts() {
        assert!(!IDENTIFIER.is_match("users; DROP TABLE x"));
        assert!(IDENTIFIER.is_match("user_accounts"));
    }
}
