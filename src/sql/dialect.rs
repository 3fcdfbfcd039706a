//! Dialect-aware syntax check used by the validator.
//!
//! A statement that the `sqlparser` crate cannot parse is not
//! automatically rejected: DDL varies enough between engines that a
//! generic parser routinely rejects valid statements. We accept those
//! when the statement is recognizably a DDL form for a standard object
//! kind, trusting the live engine to reject genuinely malformed SQL.

use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser as SqlParser;

use crate::adapters::DatabaseKind;
use regex::Regex;
use std::sync::LazyLock;

static DDL_FALLBACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(create|alter|drop|truncate)\s+(table|database|schema|index|view|function|procedure|trigger|sequence|user|role)\b").unwrap()
});

fn dialect_for(kind: DatabaseKind) -> Box<dyn Dialect> {
    match kind {
        DatabaseKind::Postgresql => Box::new(PostgreSqlDialect {}),
        DatabaseKind::Mysql => Box::new(MySqlDialect {}),
        DatabaseKind::Mongodb => Box::new(GenericDialect {}),
    }
}

/// Returns `Ok(())` when `sql` parses under the engine's dialect, or is
/// accepted as a DDL statement the parser doesn't model, and an `Err`
/// with a short remediation hint otherwise.
pub fn check_syntax(sql: &str, kind: DatabaseKind) -> Result<(), String> {
    let dialect = dialect_for(kind);
    match SqlParser::parse_sql(dialect.as_ref(), sql) {
        Ok(_) => Ok(()),
        Err(_) if DDL_FALLBACK.is_match(sql) => Ok(()),
        Err(e) => Err(format!(
            "could not parse statement ({}); check quotes, matching braces, and statement terminators",
            e
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_select() {
        assert!(check_syntax("SELECT 1", DatabaseKind::Postgresql).is_ok());
    }

    #[test]
    fn accepts_ddl_the_parser_cannot_model() {
        assert!(check_syntax(
            "CREATE TABLE users (id serial PRIMARY KEY) WITH (fillfactor = 70)",
            DatabaseKind::Postgresql
        )
        .is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(check_syntax("SELEKT * WHERE", DatabaseKind::Postgresql).is_err());
    }
}
