//! Recognize `db[.name].op(args).chain()` shell statements.
//!
//! The split into segments is depth-aware: a `.` inside `()`, `[]`,
//! `{}`, or a string literal is never a segment boundary. This mirrors
//! the character-scanning style used by the SQL statement splitter
//! rather than building a full expression grammar, since the shell
//! dialect this parser needs to recognize is a fixed, shallow shape
//! (`db`, an optional `getSiblingDB`, an optional collection, one
//! operation, and a chain) rather than arbitrary JavaScript.

use crate::error::{GatewayError, Result};
use crate::mongo::{ChainCall, MongoTarget, ParsedMongoQuery};

use super::args::parse_mongo_args;

/// One `name` or `name(args)` piece of a dot-separated statement.
struct Segment {
    name: String,
    args: Option<String>,
}

/// Parse a shell statement into a [`ParsedMongoQuery`].
pub fn parse_mongo_query(statement: &str) -> Result<ParsedMongoQuery> {
    let trimmed = strip_wrapping(statement);

    if let Some(rest) = strip_show_prefix(&trimmed) {
        return match rest.trim() {
            "dbs" | "databases" => Ok(ParsedMongoQuery {
                database: None,
                collection: None,
                operation: "listDatabases".to_string(),
                args: Vec::new(),
                chain: Vec::new(),
                target: MongoTarget::Admin,
            }),
            "collections" => Ok(ParsedMongoQuery {
                database: None,
                collection: None,
                operation: "listCollections".to_string(),
                args: Vec::new(),
                chain: Vec::new(),
                target: MongoTarget::Db,
            }),
            other => Err(GatewayError::client_input(format!("unsupported shell command 'show {}'", other))),
        };
    }

    if let Some(rest) = trimmed.strip_prefix("use ") {
        let name = rest.trim().trim_matches(|c| c == '"' || c == '\'');
        if name.is_empty() {
            return Err(GatewayError::client_input("use requires a database name"));
        }
        return Ok(ParsedMongoQuery {
            database: Some(name.to_string()),
            collection: None,
            operation: "use".to_string(),
            args: vec![serde_json::json!(name)],
            chain: Vec::new(),
            target: MongoTarget::Db,
        });
    }

    let segments = split_segments(&trimmed)?;
    let mut iter = segments.into_iter();

    let head = iter.next().ok_or_else(|| GatewayError::client_input("empty query"))?;
    if head.name != "db" {
        return Err(GatewayError::client_input("query must start with 'db'"));
    }

    let mut rest: Vec<Segment> = iter.collect();
    if rest.is_empty() {
        return Err(GatewayError::client_input("query has no operation after 'db'"));
    }

    let mut database = None;
    if rest[0].name == "getSiblingDB" {
        let seg = rest.remove(0);
        let args = parse_mongo_args(seg.args.as_deref().unwrap_or(""))?;
        let name = args
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::client_input("getSiblingDB requires a database name"))?;
        database = Some(name.to_string());
        if rest.is_empty() {
            return Err(GatewayError::client_input("query has no operation after getSiblingDB(...)"));
        }
    }

    if rest[0].name == "admin" && rest[0].args.as_deref().unwrap_or("").trim().is_empty() {
        rest.remove(0);
        let op_seg = rest
            .first()
            .ok_or_else(|| GatewayError::client_input("admin() requires an operation call"))?;
        if op_seg.args.is_none() {
            return Err(GatewayError::client_input(format!("'{}' is not callable on admin()", op_seg.name)));
        }
        let operation = op_seg.name.clone();
        let op_args = parse_mongo_args(op_seg.args.as_deref().unwrap_or(""))?;
        let chain = build_chain(&rest[1..])?;
        return Ok(ParsedMongoQuery {
            database,
            collection: None,
            operation,
            args: op_args,
            chain,
            target: MongoTarget::Admin,
        });
    }

    // A callable first segment here (other than `admin`) is a db-level
    // operation: `db.dropDatabase()`, `db.listCollections()`, etc.
    if rest[0].args.is_some() {
        let op_seg = rest.remove(0);
        let operation = op_seg.name;
        let op_args = parse_mongo_args(op_seg.args.as_deref().unwrap_or(""))?;
        let chain = build_chain(&rest)?;
        return Ok(ParsedMongoQuery { database, collection: None, operation, args: op_args, chain, target: MongoTarget::Db });
    }

    // Otherwise it names a collection; the next segment must be the call.
    let collection_seg = rest.remove(0);
    if rest.is_empty() {
        return Err(GatewayError::client_input(format!("no operation called on collection '{}'", collection_seg.name)));
    }
    let op_seg = rest.remove(0);
    if op_seg.args.is_none() {
        return Err(GatewayError::client_input(format!("'{}' is not callable", op_seg.name)));
    }
    let operation = op_seg.name;
    let op_args = parse_mongo_args(op_seg.args.as_deref().unwrap_or(""))?;
    let chain = build_chain(&rest)?;

    Ok(ParsedMongoQuery {
        database,
        collection: Some(collection_seg.name),
        operation,
        args: op_args,
        chain,
        target: MongoTarget::Collection,
    })
}

fn build_chain(segments: &[Segment]) -> Result<Vec<ChainCall>> {
    segments
        .iter()
        .map(|seg| {
            if seg.name == "length" && seg.args.is_none() {
                return Err(GatewayError::client_input(
                    "'.length' is not supported on a query result; use countDocuments() instead",
                ));
            }
            if matches!(seg.name.as_str(), "toArray" | "count") && seg.args.is_some() {
                return Err(GatewayError::client_input(format!(
                    "'.{}()' is unnecessary here; the gateway always materializes the cursor",
                    seg.name
                )));
            }
            let args = parse_mongo_args(seg.args.as_deref().unwrap_or(""))?;
            Ok(ChainCall { name: seg.name.clone(), args })
        })
        .collect()
}

fn strip_wrapping(statement: &str) -> String {
    let mut s = statement.trim();
    if let Some(stripped) = s.strip_suffix(';') {
        s = stripped.trim();
    }
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[s.len() - 1] == b'"') || (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'') {
            s = &s[1..s.len() - 1];
        }
    }
    s.trim().to_string()
}

fn strip_show_prefix(s: &str) -> Option<String> {
    s.strip_prefix("show ").map(|rest| rest.to_string())
}

/// Depth-aware split on top-level `.`, returning each piece parsed
/// into a name and an optional raw argument string.
fn split_segments(s: &str) -> Result<Vec<Segment>> {
    let chars: Vec<char> = s.chars().collect();
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = in_string {
            if c == '\\' && i + 1 < chars.len() {
                i += 2;
                continue;
            }
            if c == q {
                in_string = None;
            }
            i += 1;
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '.' if depth == 0 => {
                pieces.push(chars[start..i].iter().collect::<String>());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if depth != 0 {
        return Err(GatewayError::client_input("unbalanced parentheses or braces in query"));
    }
    pieces.push(chars[start..].iter().collect::<String>());

    pieces
        .into_iter()
        .map(|p| parse_segment(p.trim()))
        .collect()
}

fn parse_segment(piece: &str) -> Result<Segment> {
    if piece.is_empty() {
        return Err(GatewayError::client_input("empty segment in query"));
    }
    match piece.find('(') {
        None => Ok(Segment { name: piece.to_string(), args: None }),
        Some(open) => {
            if !piece.ends_with(')') {
                return Err(GatewayError::client_input(format!("unterminated call in '{}'", piece)));
            }
            let name = piece[..open].trim().to_string();
            let args = piece[open + 1..piece.len() - 1].to_string();
            Ok(Segment { name, args: Some(args) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_find_with_projection() {
        let parsed = parse_mongo_query("db.students.find({}, { name: 1, _id: 0 })").unwrap();
        assert_eq!(parsed.target, MongoTarget::Collection);
        assert_eq!(parsed.collection.as_deref(), Some("students"));
        assert_eq!(parsed.operation, "find");
        assert_eq!(parsed.args.len(), 2);
        assert!(parsed.chain.is_empty());
    }

    #[test]
    fn distinguishes_one_arg_from_two_arg_find() {
        let one = parse_mongo_query("db.students.find({})").unwrap();
        assert_eq!(one.args.len(), 1);
        let two = parse_mongo_query("db.students.find({}, {})").unwrap();
        assert_eq!(two.args.len(), 2);
    }

    #[test]
    fn parses_chained_cursor_methods() {
        let parsed =
            parse_mongo_query("db.students.find({age:{$gt:10}}).sort({name:1}).limit(5);").unwrap();
        assert_eq!(parsed.chain.len(), 2);
        assert_eq!(parsed.chain[0].name, "sort");
        assert_eq!(parsed.chain[1].name, "limit");
    }

    #[test]
    fn show_dbs_maps_to_admin_list_databases() {
        let parsed = parse_mongo_query("show dbs").unwrap();
        assert_eq!(parsed.target, MongoTarget::Admin);
        assert_eq!(parsed.operation, "listDatabases");
    }

    #[test]
    fn use_sets_database_and_operation() {
        let parsed = parse_mongo_query("use reporting").unwrap();
        assert_eq!(parsed.database.as_deref(), Some("reporting"));
        assert_eq!(parsed.operation, "use");
    }

    #[test]
    fn admin_target_dispatches_correctly() {
        let parsed = parse_mongo_query("db.admin().listDatabases()").unwrap();
        assert_eq!(parsed.target, MongoTarget::Admin);
        assert_eq!(parsed.operation, "listDatabases");
    }

    #[test]
    fn db_level_operation_without_collection() {
        let parsed = parse_mongo_query("db.dropDatabase()").unwrap();
        assert_eq!(parsed.target, MongoTarget::Db);
        assert_eq!(parsed.operation, "dropDatabase");
    }

    #[test]
    fn get_sibling_db_sets_database() {
        let parsed = parse_mongo_query(r#"db.getSiblingDB("reporting").orders.find({})"#).unwrap();
        assert_eq!(parsed.database.as_deref(), Some("reporting"));
        assert_eq!(parsed.collection.as_deref(), Some("orders"));
    }

    #[test]
    fn rejects_length_access() {
        let err = parse_mongo_query("db.students.find({}).length").unwrap_err();
        assert!(err.message().contains("countDocuments"));
    }

    #[test]
    fn rejects_deprecated_to_array_call() {
        let err = parse_mongo_query("db.students.find({}).toArray()").unwrap_err();
        assert!(err.message().contains("unnecessary"));
    }

    #[test]
    fn dot_inside_string_literal_is_not_a_boundary() {
        let parsed = parse_mongo_query(r#"db.students.find({name: "a.b.c"})"#).unwrap();
        assert_eq!(parsed.collection.as_deref(), Some("students"));
    }
}
