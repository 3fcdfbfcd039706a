//! MySQL adapter: pooled `sqlx` connection with the same contract as
//! the Postgres adapter, adapted to MySQL's identifier quoting and
//! information_schema layout.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
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
static SYSTEM_DATABASES: &[&str] = &["information_schema", "mysql", "performance_schema", "sys"];

pub struct MysqlAdapter {
    pool: Option<MySqlPool>,
    transaction: Option<sqlx::Transaction<'static, sqlx::MySql>>,
    statement_timeout_ms: i64,
}

impl MysqlAdapter {
    pub fn new(query_timeout: Duration) -> Self {
        MysqlAdapter { pool: None, transaction: None, statement_timeout_ms: query_timeout.as_millis() as i64 }
    }

    fn pool(&self) -> Result<&MySqlPool> {
        self.pool.as_ref().ok_or_else(|| GatewayError::execution("not connected"))
    }
}

#[async_trait]
impl Adapter for MysqlAdapter {
    async fn connect(&mut self, url: &str) -> Result<()> {
        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .idle_timeout(POOL_IDLE_TIMEOUT)
            .acquire_timeout(POOL_CONNECT_TIMEOUT)
            .connect(url)
            .await?;
        self.pool = Some(pool);
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
                return Err(GatewayError::client_input("invalid database name"));
            }
            let stmt = format!("USE `{}`", db);
            sqlx::query(&stmt).execute(self.pool()?).await?;
        }
        sqlx::query(&format!("SET SESSION MAX_EXECUTION_TIME = {}", self.statement_timeout_ms))
            .execute(self.pool()?)
            .await?;

        let rewritten = if options.explain && sql::is_select_like(query) {
            sql::to_explain(query, crate::adapters::DatabaseKind::Mysql)
        } else {
            sql::pagination::paginate(query, options.limit, options.offset, options.limit.unwrap_or(1000))
        };

        if !sql::is_select_like(&rewritten) {
            let result = if self.transaction.is_some() {
                let tx = self.transaction.as_mut().expect("checked above");
                sqlx::query(&rewritten).execute(&mut **tx).await?
            } else {
                sqlx::query(&rewritten).execute(self.pool()?).await?
            };
            let insert_id =
                if result.last_insert_id() > 0 { Some(serde_json::json!(result.last_insert_id())) } else { None };
            return Ok(QueryResult::affected(
                result.rows_affected(),
                insert_id,
                started.elapsed().as_millis() as u64,
            ));
        }

        let rows: Vec<MySqlRow> = if self.transaction.is_some() {
            let tx = self.transaction.as_mut().expect("checked above");
            sqlx::query(&rewritten).fetch_all(&mut **tx).await?
        } else {
            sqlx::query(&rewritten).fetch_all(self.pool()?).await?
        };

        let elapsed = started.elapsed().as_millis() as u64;
        let columns = row_columns(&rows);
        let out_rows = rows.iter().map(mysql_row_to_map).collect();

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
            .filter(|n| !SYSTEM_DATABASES.contains(&n.as_str()))
            .map(|name| DatabaseEntry { name })
            .collect())
    }

    async fn get_tables(&mut self, database: &str) -> Result<Vec<TableEntry>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT table_name, table_type FROM information_schema.tables WHERE table_schema = ? ORDER BY table_name",
        )
        .bind(database)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, kind)| TableEntry {
                name,
                kind: if kind.eq_ignore_ascii_case("VIEW") { "view".to_string() } else { "table".to_string() },
            })
            .collect())
    }

    async fn get_columns(&mut self, database: &str, object: &str) -> Result<Vec<ColumnEntry>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT column_name, data_type, is_nullable, column_key FROM information_schema.columns \
             WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
        )
        .bind(database)
        .bind(object)
        .fetch_all(self.pool()?)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, type_name, nullable, key)| ColumnEntry {
                name,
                type_name,
                nullable: nullable == "YES",
                primary_key: key == "PRI",
            })
            .collect())
    }

    async fn get_server_version(&mut self) -> Result<String> {
        let (version,): (String,) = sqlx::query_as("SELECT VERSION()").fetch_one(self.pool()?).await?;
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
        let stmt = format!("DROP DATABASE IF EXISTS `{}`", database);
        sqlx::query(&stmt).execute(self.pool()?).await?;
        Ok(())
    }

    async fn drop_all_user_databases(&mut self) -> Result<()> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT schema_name FROM information_schema.schemata").fetch_all(self.pool()?).await?;
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

fn row_columns(rows: &[MySqlRow]) -> Vec<ColumnInfo> {
    let Some(first) = rows.first() else { return Vec::new() };
    first
        .columns()
        .iter()
        .map(|c| ColumnInfo { name: c.name().to_string(), type_name: mysql_type_name(c.type_info().name()) })
        .collect()
}

/// Translate MySQL type names to the human-readable names the
/// schema/result surfaces use. Unknown types pass through as
/// `unknown(<name>)` rather than failing the request.
fn mysql_type_name(name: &str) -> String {
    match name.to_ascii_uppercase().as_str() {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => "integer".to_string(),
        "FLOAT" | "DOUBLE" | "DECIMAL" => "number".to_string(),
        "BOOLEAN" | "BOOL" => "boolean".to_string(),
        "VARCHAR" | "CHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" => "string".to_string(),
        "DATETIME" | "TIMESTAMP" | "DATE" | "TIME" => "datetime".to_string(),
        "JSON" => "json".to_string(),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "VARBINARY" | "BINARY" => "binary".to_string(),
        other => format!("unknown({})", other.to_ascii_lowercase()),
    }
}

fn mysql_row_to_map(row: &MySqlRow) -> BTreeMap<String, serde_json::Value> {
    let mut map = BTreeMap::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = mysql_value_to_json(row, i, column.type_info().name());
        map.insert(column.name().to_string(), value);
    }
    map
}

fn mysql_value_to_json(row: &MySqlRow, idx: usize, type_name: &str) -> serde_json::Value {
    match type_name.to_ascii_uppercase().as_str() {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" => {
            row.try_get::<i32, _>(idx).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null)
        }
        "BIGINT" => row.try_get::<i64, _>(idx).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
        "FLOAT" => row.try_get::<f32, _>(idx).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
        "DOUBLE" | "DECIMAL" => {
            row.try_get::<f64, _>(idx).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null)
        }
        "BOOLEAN" | "BOOL" => {
            row.try_get::<bool, _>(idx).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null)
        }
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .map(|v| serde_json::json!(v.to_string()))
            .unwrap_or(serde_json::Value::Null),
        "JSON" => row.try_get::<serde_json::Value, _>(idx).unwrap_or(serde_json::Value::Null),
        _ => row.try_get::<String, _>(idx).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_type_name_maps_known_types() {
        assert_eq!(mysql_type_name("INT"), "integer");
        assert_eq!(mysql_type_name("varchar"), "string");
        assert_eq!(mysql_type_name("json"), "json");
    }

    #[test]
    fn mysql_type_name_falls_back_for_unknown_types() {
        assert_eq!(mysql_type_name("geometry"), "unknown(geometry)");
    }

    #[test]
    fn system_databases_are_excluded_by_name() {
        assert!(SYSTEM_DATABASES.contains(&"mysql"));
        assert!(!SYSTEM_DATABASES.contains(&"u_abc123"));
    }
}
