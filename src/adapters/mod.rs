//! Database adapter contract.
//!
//! Every backing engine (PostgreSQL, MySQL, MongoDB) is exposed to the
//! rest of the gateway through the single [`Adapter`] trait so the
//! session manager, sanitizer, and HTTP handlers never special-case a
//! specific driver. Concrete implementations live in
//! [`postgres`], [`mysql`], and [`mongo`].

pub mod mongo;
pub mod mysql;
pub mod postgres;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The three backing engines the gateway mediates access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Postgresql,
    Mysql,
    Mongodb,
}

impl DatabaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Postgresql => "postgresql",
            DatabaseKind::Mysql => "mysql",
            DatabaseKind::Mongodb => "mongodb",
        }
    }

    /// SQL engines support per-tenant isolation databases; Mongo doesn't.
    pub fn supports_isolation(&self) -> bool {
        matches!(self, DatabaseKind::Postgresql | DatabaseKind::Mysql)
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single declared column in a [`QueryResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// The uniform, normalized shape every adapter operation resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<BTreeMap<String, serde_json::Value>>,
    pub columns: Vec<ColumnInfo>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        QueryResult { rows: Vec::new(), columns: Vec::new(), row_count: 0, execution_time_ms: 0 }
    }

    /// Build the synthetic single-row result returned for non-row-producing
    /// statements (INSERT/UPDATE/DELETE, DDL, etc).
    pub fn affected(affected_rows: u64, insert_id: Option<serde_json::Value>, elapsed_ms: u64) -> Self {
        let mut row = BTreeMap::new();
        row.insert("affectedRows".to_string(), serde_json::json!(affected_rows));
        row.insert("acknowledged".to_string(), serde_json::json!(true));
        if let Some(id) = insert_id {
            row.insert("insertId".to_string(), id);
        }
        QueryResult {
            rows: vec![row],
            columns: Vec::new(),
            row_count: 1,
            execution_time_ms: elapsed_ms,
        }
    }

    /// Build the synthetic "simulated" row for destructive-operation
    /// simulation on default connections lacking `allow_destructive`.
    pub fn simulated(operation: &str, message: &str) -> Self {
        let mut row = BTreeMap::new();
        row.insert("acknowledged".to_string(), serde_json::json!(true));
        row.insert("simulated".to_string(), serde_json::json!(true));
        row.insert("operation".to_string(), serde_json::json!(operation));
        row.insert("message".to_string(), serde_json::json!(message));
        QueryResult { rows: vec![row], columns: Vec::new(), row_count: 1, execution_time_ms: 0 }
    }
}

/// Execution configuration threaded through `execute_query`.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub explain: bool,
    pub user_id: Option<String>,
    pub is_isolated: bool,
    pub user_database: Option<String>,
    pub allow_destructive: bool,
}

/// A database/schema entry returned by `get_databases`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub name: String,
}

/// A table/view/collection entry returned by `get_tables`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String, // "table" | "view" | "collection"
}

/// A column/field entry returned by `get_columns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub nullable: bool,
    pub primary_key: bool,
}

/// Uniform capability surface every engine adapter implements.
///
/// An adapter is exclusively owned by a single [`crate::session::Session`]
/// for its entire lifetime; it is never shared across concurrent requests.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn connect(&mut self, url: &str) -> Result<()>;
    async fn disconnect(&mut self) -> Result<()>;
    fn is_connected(&self) -> bool;

    async fn execute_query(
        &mut self,
        query: &str,
        database: Option<&str>,
        options: &QueryOptions,
    ) -> Result<QueryResult>;

    async fn get_databases(&mut self) -> Result<Vec<DatabaseEntry>>;
    async fn get_tables(&mut self, database: &str) -> Result<Vec<TableEntry>>;
    async fn get_columns(&mut self, database: &str, object: &str) -> Result<Vec<ColumnEntry>>;
    async fn get_server_version(&mut self) -> Result<String>;

    async fn begin_transaction(&mut self) -> Result<()>;
    async fn commit_transaction(&mut self) -> Result<()>;
    async fn rollback_transaction(&mut self) -> Result<()>;
    fn is_transaction_active(&self) -> bool;

    /// Health check issuing a trivial command (`SELECT 1` / `admin.ping()`).
    async fn health_check(&mut self) -> Result<()>;

    /// Drop a single per-tenant isolation database, called nightly for
    /// every non-system database name (idempotent: `DROP ... IF EXISTS`).
    async fn cleanup_database(&mut self, database: &str) -> Result<()>;

    /// Drop every non-system database this engine hosts.
    async fn drop_all_user_databases(&mut self) -> Result<()>;
}

/// Construct a fresh, unconnected adapter for the given engine kind,
/// configured with the gateway's `QUERY_TIMEOUT_MS` (spec.md §6.2).
pub fn new_adapter(kind: DatabaseKind, query_timeout: Duration) -> Box<dyn Adapter> {
    match kind {
        DatabaseKind::Postgresql => Box::new(postgres::PostgresAdapter::new(query_timeout)),
        DatabaseKind::Mysql => Box::new(mysql::MysqlAdapter::new(query_timeout)),
        DatabaseKind::Mongodb => Box::new(mongo::MongoAdapter::new(query_timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_kind_wire_names() {
        assert_eq!(DatabaseKind::Postgresql.as_str(), "postgresql");
        assert_eq!(DatabaseKind::Mysql.as_str(), "mysql");
        assert_eq!(DatabaseKind::Mongodb.as_str(), "mongodb");
        assert!(!DatabaseKind::Mongodb.supports_isolation());
        assert!(DatabaseKind::Postgresql.supports_isolation());
    }

    #[test]
    fn simulated_result_never_touches_data() {
        let result = QueryResult::simulated("DROP TABLE", "drop table simulated");
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0]["simulated"], serde_json::json!(true));
    }
}
