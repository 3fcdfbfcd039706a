//! SQL-dialect helpers shared by the Postgres and MySQL adapters: the
//! statement splitter (4.4), pagination/EXPLAIN rewriter (4.3), and a
//! dialect-aware syntax check used by the validator (4.6).

pub mod dialect;
pub mod pagination;
pub mod splitter;

use regex::Regex;
use std::sync::LazyLock;

static SELECT_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(select|with|show|describe|explain)\b").unwrap());

/// Whether `sql` looks like a read-only, EXPLAIN-able statement.
pub fn is_select_like(sql: &str) -> bool {
    SELECT_LIKE.is_match(sql.trim())
}

/// Rewrite `sql` as an `EXPLAIN` request for the given engine.
pub fn to_explain(sql: &str, kind: crate::adapters::DatabaseKind) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    match kind {
        crate::adapters::DatabaseKind::Postgresql => {
            format!("EXPLAIN (ANALYZE, COSTS, BUFFERS) {}", trimmed)
        }
        _ => format!("EXPLAIN {}", trimmed),
    }
}
