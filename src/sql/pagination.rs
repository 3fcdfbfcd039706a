//! Append `LIMIT`/`OFFSET` to a single SELECT-like statement, or leave it
//! untouched when that would be unsafe or redundant.

use regex::Regex;
use std::sync::LazyLock;

static SELECT_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(select|with|show|describe|explain)\b").unwrap());
static HAS_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(limit|fetch\s+first)\b").unwrap());
static HAS_OFFSET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\boffset\b").unwrap());

/// Rewrite `sql` to carry pagination, per spec 4.3:
/// - no-op on empty/multi-statement/non-SELECT-like/already-paginated input
/// - otherwise append ` LIMIT <limit>` (and ` OFFSET <offset>` when
///   `offset > 0`), reattaching a trailing `;` if one was present.
pub fn paginate(sql: &str, limit: Option<i64>, offset: Option<i64>, default_limit: i64) -> String {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return sql.to_string();
    }
    if crate::sql::splitter::split_statements(trimmed).len() > 1 {
        return sql.to_string();
    }
    if !SELECT_LIKE.is_match(trimmed) {
        return sql.to_string();
    }
    if HAS_LIMIT.is_match(trimmed) {
        return sql.to_string();
    }

    let (body, had_semicolon) = match trimmed.strip_suffix(';') {
        Some(b) => (b.trim_end(), true),
        None => (trimmed, false),
    };

    let mut rewritten = format!("{} LIMIT {}", body, limit.unwrap_or(default_limit));
    if let Some(off) = offset {
        if off > 0 && !HAS_OFFSET.is_match(trimmed) {
            rewritten.push_str(&format!(" OFFSET {}", off));
        }
    }
    if had_semicolon {
        rewritten.push(';');
    }
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_default_limit() {
        assert_eq!(paginate("SELECT * FROM t", Some(50), None, 1000), "SELECT * FROM t LIMIT 50");
    }

    #[test]
    fn reattaches_trailing_semicolon() {
        assert_eq!(
            paginate("SELECT * FROM t;", Some(50), None, 1000),
            "SELECT * FROM t LIMIT 50;"
        );
    }

    #[test]
    fn no_op_when_already_limited() {
        assert_eq!(paginate("SELECT * FROM t LIMIT 5", Some(50), None, 1000), "SELECT * FROM t LIMIT 5");
    }

    #[test]
    fn no_op_on_multiple_statements() {
        assert_eq!(paginate("SELECT 1; SELECT 2", Some(50), None, 1000), "SELECT 1; SELECT 2");
    }

    #[test]
    fn adds_offset_when_positive() {
        assert_eq!(
            paginate("SELECT * FROM t", Some(10), Some(20), 1000),
            "SELECT * FROM t LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn no_offset_when_zero() {
        assert_eq!(paginate("SELECT * FROM t", Some(10), Some(0), 1000), "SELECT * FROM t LIMIT 10");
    }

    #[test]
    fn no_op_on_non_select() {
        assert_eq!(paginate("DELETE FROM t", Some(10), None, 1000), "DELETE FROM t");
    }

    #[test]
    fn default_limit_applied_when_unspecified() {
        assert_eq!(paginate("SELECT * FROM t", None, None, 1000), "SELECT * FROM t LIMIT 1000");
    }
}
