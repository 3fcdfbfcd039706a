//! Query Validator & Sanitizer.
//!
//! Runs before every execution: length and nesting limits, then a
//! dialect-specific dangerous-pattern scan that only applies to
//! sessions bound to a configured default connection, then a
//! dialect-aware syntax check.

use std::sync::LazyLock;

use regex::Regex;

use crate::adapters::DatabaseKind;
use crate::error::{GatewayError, Result};
use crate::mongo;
use crate::sql;

/// Balanced-bracket nesting depth, counting `()`, `[]`, `{}` uniformly
/// (string contents are skipped so quoted brackets don't count).
fn max_nesting_depth(text: &str) -> usize {
    let mut depth = 0i32;
    let mut max_depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = in_string {
            if c == '\\' {
                chars.next();
            } else if c == q {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '(' | '[' | '{' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    max_depth.max(0) as usize
}

/// Reject empty input and enforce the configured length/depth limits.
pub fn check_length_and_depth(query: &str, max_length: usize, max_depth: usize) -> Result<()> {
    if query.trim().is_empty() {
        return Err(GatewayError::validation("query must not be empty"));
    }
    if query.len() > max_length {
        return Err(GatewayError::validation(format!(
            "query exceeds the maximum length of {} characters",
            max_length
        )));
    }
    let depth = max_nesting_depth(query);
    if depth > max_depth {
        return Err(GatewayError::validation(format!(
            "query nesting depth {} exceeds the maximum of {}",
            depth, max_depth
        )));
    }
    Ok(())
}

static SQL_DANGEROUS_COMMON: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i);\s*drop\s+(table|database|schema)\b").unwrap(),
        Regex::new(r"(?i);\s*truncate\b").unwrap(),
        Regex::new(r"(?i);\s*delete\s+from\b").unwrap(),
        Regex::new(r"--").unwrap(),
        Regex::new(r"/\*").unwrap(),
        Regex::new(r"(?i)\b(alter|create)\s+(database|schema|user|role)\b").unwrap(),
        Regex::new(r"(?i)\bgrant\b").unwrap(),
        Regex::new(r"(?i)\brevoke\b").unwrap(),
        Regex::new(r"(?i)\bexec(ute)?\s*\(").unwrap(),
        Regex::new(r"(?i)\bsp_\w+").unwrap(),
    ]
});

static MYSQL_DANGEROUS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\bload\s+(data|file)\b").unwrap(),
        Regex::new(r"(?i)\binto\s+outfile\b").unwrap(),
    ]
});

static POSTGRES_DANGEROUS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\bcopy\b.*\bfrom\s+program\b").unwrap(),
        Regex::new(r"(?i)\bpg_read_file\s*\(").unwrap(),
    ]
});

static MONGO_DANGEROUS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\$where\b").unwrap(),
        Regex::new(r"\$eval\b").unwrap(),
        Regex::new(r"\$function\b").unwrap(),
        Regex::new(r"(?i)db\.eval\s*\(").unwrap(),
        Regex::new(r"(?i)db\.runCommand\s*\(").unwrap(),
    ]
});

/// Scan for known-dangerous substrings, applied only to default-connection
/// sessions. Returns the offending pattern's plain-English description.
pub fn check_dangerous_patterns(query: &str, kind: DatabaseKind) -> Result<()> {
    let patterns: &[Regex] = match kind {
        DatabaseKind::Mongodb => &MONGO_DANGEROUS,
        DatabaseKind::Mysql | DatabaseKind::Postgresql => &SQL_DANGEROUS_COMMON,
    };
    if let Some(m) = patterns.iter().find(|re| re.is_match(query)) {
        return Err(GatewayError::validation(format!("query contains a disallowed pattern: {}", m.as_str())));
    }
    let extra: &[Regex] = match kind {
        DatabaseKind::Mysql => &MYSQL_DANGEROUS,
        DatabaseKind::Postgresql => &POSTGRES_DANGEROUS,
        DatabaseKind::Mongodb => &[],
    };
    if let Some(m) = extra.iter().find(|re| re.is_match(query)) {
        return Err(GatewayError::validation(format!("query contains a disallowed pattern: {}", m.as_str())));
    }
    Ok(())
}

/// Dialect-aware syntax check: SQL engines defer to [`sql::dialect`];
/// Mongo defers to the shell parser itself.
pub fn check_dialect_syntax(query: &str, kind: DatabaseKind) -> Result<()> {
    match kind {
        DatabaseKind::Mongodb => {
            mongo::parse_mongo_query(query)?;
            Ok(())
        }
        DatabaseKind::Postgresql | DatabaseKind::Mysql => {
            sql::dialect::check_syntax(query, kind).map_err(GatewayError::validation)
        }
    }
}

/// Full validator pipeline: length/depth, then (for default connections)
/// dangerous-pattern scan, then dialect syntax check.
pub fn validate(
    query: &str,
    kind: DatabaseKind,
    is_default_connection: bool,
    max_length: usize,
    max_depth: usize,
) -> Result<()> {
    check_length_and_depth(query, max_length, max_depth)?;
    if is_default_connection {
        check_dangerous_patterns(query, kind)?;
    }
    check_dialect_syntax(query, kind)
}

static DESTRUCTIVE_SQL: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?i)\bdrop\s+database\b").unwrap(), "DROP DATABASE"),
        (Regex::new(r"(?i)\bdrop\s+schema\b").unwrap(), "DROP SCHEMA"),
        (Regex::new(r"(?i)\bdrop\s+table\b").unwrap(), "DROP TABLE"),
        (Regex::new(r"(?i)\bdrop\s+view\b").unwrap(), "DROP VIEW"),
        (Regex::new(r"(?i)\bdrop\s+index\b").unwrap(), "DROP INDEX"),
        (Regex::new(r"(?i)\bdrop\s+function\b").unwrap(), "DROP FUNCTION"),
        (Regex::new(r"(?i)\bdrop\s+procedure\b").unwrap(), "DROP PROCEDURE"),
        (Regex::new(r"(?i)\bdrop\s+trigger\b").unwrap(), "DROP TRIGGER"),
        (Regex::new(r"(?i)\btruncate\s+table\b").unwrap(), "TRUNCATE TABLE"),
    ]
});

static DELETE_FROM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bdelete\s+from\b").unwrap());
static WHERE_FALSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)where\s+1\s*=\s*0").unwrap());

/// Classify `sql` as a destructive statement, returning the operation
/// label used in the simulated-result row. `DELETE FROM` is exempted
/// when it carries an always-false `WHERE 1=0` guard, the convention
/// callers use to run a no-op delete against a default connection.
pub fn classify_destructive_sql(sql: &str) -> Option<&'static str> {
    for (re, label) in DESTRUCTIVE_SQL.iter() {
        if re.is_match(sql) {
            return Some(label);
        }
    }
    if DELETE_FROM.is_match(sql) && !WHERE_FALSE.is_match(sql) {
        return Some("DELETE FROM");
    }
    None
}

/// Whether a parsed Mongo operation is destructive for simulation
/// purposes (`dropDatabase`, `dropCollection`, `drop`).
pub fn is_destructive_mongo_operation(operation: &str) -> bool {
    matches!(operation, "dropDatabase" | "dropCollection" | "drop")
}

static DEPRECATED_MONGO_OPS: LazyLock<std::collections::HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    [
        ("findAndModify", "findOneAndUpdate or findOneAndDelete"),
        ("group", "aggregate"),
        ("mapReduce", "aggregate"),
        ("insert", "insertOne or insertMany"),
        ("update", "updateOne or updateMany"),
        ("remove", "deleteOne or deleteMany"),
        ("save", "insertOne/replaceOne"),
        ("ensureIndex", "createIndex"),
        ("copyTo", "aggregate with $out"),
    ]
    .into_iter()
    .collect()
});

/// Migration-guidance message for a deprecated shell operation, or
/// `None` if `operation` is still supported.
pub fn deprecated_mongo_operation_message(operation: &str) -> Option<String> {
    DEPRECATED_MONGO_OPS
        .get(operation)
        .map(|modern| format!("'{}' is deprecated; use {} instead", operation, modern))
}

static DB_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:database|schema|db)\s*[:.]?\s*[`"]?([A-Za-z_][A-Za-z0-9_]*)[`"]?\."#).unwrap()
});

/// For isolated MySQL export: extract `db.table`-qualified database
/// names referenced in the statement, so the caller can reject any
/// query that reaches outside the tenant's own database.
pub fn extract_referenced_databases(sql: &str) -> Vec<String> {
    static QUALIFIED: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s*\.\s*[A-Za-z_][A-Za-z0-9_]*\b").unwrap());
    let mut names: Vec<String> = QUALIFIED
        .captures_iter(sql)
        .map(|c| c[1].to_string())
        .filter(|n| !n.eq_ignore_ascii_case("information_schema"))
        .collect();
    names.extend(DB_REFERENCE.captures_iter(sql).map(|c| c[1].to_string()));
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_query() {
        assert!(check_length_and_depth("", 100, 10).is_err());
    }

    #[test]
    fn rejects_overlong_query() {
        let long = "a".repeat(200);
        assert!(check_length_and_depth(&long, 100, 10).is_err());
    }

    #[test]
    fn rejects_excessive_nesting() {
        let nested = "(".repeat(11) + &")".repeat(11);
        assert!(check_length_and_depth(&nested, 1000, 10).is_err());
    }

    #[test]
    fn accepts_shallow_well_formed_query() {
        assert!(check_length_and_depth("SELECT * FROM t WHERE (a = 1)", 1000, 10).is_ok());
    }

    #[test]
    fn flags_drop_table_after_semicolon() {
        assert!(check_dangerous_patterns("SELECT 1; DROP TABLE users", DatabaseKind::Postgresql).is_err());
    }

    #[test]
    fn flags_mysql_into_outfile() {
        assert!(check_dangerous_patterns("SELECT * INTO OUTFILE '/tmp/x'", DatabaseKind::Mysql).is_err());
    }

    #[test]
    fn flags_postgres_copy_from_program() {
        assert!(
            check_dangerous_patterns("COPY t FROM PROGRAM 'id'", DatabaseKind::Postgresql).is_err()
        );
    }

    #[test]
    fn flags_mongo_where_operator() {
        assert!(check_dangerous_patterns(r#"{"$where": "this.a == 1"}"#, DatabaseKind::Mongodb).is_err());
    }

    #[test]
    fn allows_benign_select() {
        assert!(check_dangerous_patterns("SELECT * FROM users WHERE id = 1", DatabaseKind::Postgresql).is_ok());
    }

    #[test]
    fn classifies_drop_table_as_destructive() {
        assert_eq!(classify_destructive_sql("DROP TABLE users;"), Some("DROP TABLE"));
    }

    #[test]
    fn exempts_guarded_delete() {
        assert_eq!(classify_destructive_sql("DELETE FROM t WHERE 1=0"), None);
        assert_eq!(classify_destructive_sql("DELETE FROM t WHERE id = 5"), Some("DELETE FROM"));
    }

    #[test]
    fn deprecated_operations_name_the_replacement() {
        let msg = deprecated_mongo_operation_message("findAndModify").unwrap();
        assert!(msg.contains("findOneAndUpdate"));
        assert!(deprecated_mongo_operation_message("find").is_none());
    }

    #[test]
    fn extracts_qualified_database_names() {
        let refs = extract_referenced_databases("SELECT * FROM other_db.sales");
        assert_eq!(refs, vec!["other_db".to_string()]);
    }
}
