//! `parseMongoArgs`: turn a shell call's raw argument text into a
//! sequence of JSON values with MongoDB-specific literals revived to
//! their BSON-typed equivalents.
//!
//! The shell accepts things plain JSON doesn't: single-quoted strings,
//! unquoted object keys, regex literals, and constructor calls like
//! `ObjectId("...")`. Rather than writing a second parser for that
//! dialect we normalize the text into strict JSON with tagged markers
//! (`__$oid`, `__$date`, `__$numberLong`, `__$regex`) and lean on
//! `serde_json` for the structural work, then revive the markers in a
//! second pass. This keeps the tolerant syntax normalizer decoupled
//! from the strict JSON parser.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{GatewayError, Result};

static REGEX_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/((?:\\.|[^/\\\n])+)/([gimsuy]*)").unwrap());
static OBJECT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"ObjectId\(\s*"([0-9a-fA-F]{24})"\s*\)"#).unwrap());
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:ISODate|new Date)\(\s*"([^"]*)"\s*\)"#).unwrap());
static NUMBER_LONG_STR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"NumberLong\(\s*"(-?\d+)"\s*\)"#).unwrap());
static NUMBER_LONG_NUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"NumberLong\(\s*(-?\d+)\s*\)").unwrap());
static NUMBER_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"NumberInt\(\s*(-?\d+)\s*\)").unwrap());
static NUMBER_DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"NumberDecimal\(\s*"([^"]*)"\s*\)"#).unwrap());
static UNQUOTED_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([{,]\s*)([A-Za-z_$][A-Za-z0-9_$]*)\s*:"#).unwrap());

/// Tag inserted for a regex literal; revived into `Bson::RegularExpression`
/// by the Mongo adapter, or left as a plain document for inspection.
pub const OID_TAG: &str = "__$oid";
pub const DATE_TAG: &str = "__$date";
pub const NUMBER_LONG_TAG: &str = "__$numberLong";
pub const REGEX_TAG: &str = "__$regex";
pub const REGEX_OPTIONS_TAG: &str = "__$options";

/// Parse a shell call's argument text (the bytes between the outer
/// parens, exclusive) into a sequence of JSON values with BSON markers
/// revived in place.
pub fn parse_mongo_args(raw: &str) -> Result<Vec<Value>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let normalized = normalize(trimmed);

    let values = parse_as_array(&normalized)
        .or_else(|_| parse_as_array(&format!("[{}]", normalized)))
        .or_else(|_| split_top_level_commas(&normalized))?;

    Ok(values.into_iter().map(revive).collect())
}

fn parse_as_array(text: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(single) => Ok(vec![single]),
        Err(e) => Err(GatewayError::client_input(format!("malformed query arguments: {}", e))),
    }
}

/// Last-resort recovery: hand-split on top-level commas and parse each
/// element independently. Used when neither direct nor array-wrapped
/// parsing succeeds, e.g. a stray trailing comma in one element.
fn split_top_level_commas(text: &str) -> Result<Vec<Value>> {
    let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut start = 0usize;
    let chars: Vec<char> = inner.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = in_string {
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == q {
                in_string = None;
            }
        } else {
            match c {
                '"' | '\'' => in_string = Some(c),
                '{' | '[' | '(' => depth += 1,
                '}' | ']' | ')' => depth -= 1,
                ',' if depth == 0 => {
                    let piece: String = chars[start..i].iter().collect();
                    parts.push(piece);
                    start = i + 1;
                }
                _ => {}
            }
        }
        i += 1;
    }
    let tail: String = chars[start..].iter().collect();
    if !tail.trim().is_empty() {
        parts.push(tail);
    }

    parts
        .into_iter()
        .map(|p| {
            serde_json::from_str(p.trim())
                .map_err(|e| GatewayError::client_input(format!("malformed query argument '{}': {}", p.trim(), e)))
        })
        .collect()
}

/// Rewrite shell-dialect syntax into strict JSON with tagged markers.
fn normalize(raw: &str) -> String {
    let mut text = raw.to_string();

    text = OBJECT_ID.replace_all(&text, format!(r#"{{"{}":"$1"}}"#, OID_TAG)).into_owned();
    text = ISO_DATE.replace_all(&text, format!(r#"{{"{}":"$1"}}"#, DATE_TAG)).into_owned();
    text = NUMBER_LONG_STR.replace_all(&text, format!(r#"{{"{}":"$1"}}"#, NUMBER_LONG_TAG)).into_owned();
    text = NUMBER_LONG_NUM.replace_all(&text, format!(r#"{{"{}":"$1"}}"#, NUMBER_LONG_TAG)).into_owned();
    text = NUMBER_INT.replace_all(&text, "$1").into_owned();
    text = NUMBER_DECIMAL.replace_all(&text, "\"$1\"").into_owned();

    text = single_quotes_to_double(&text);
    text = UNQUOTED_KEY.replace_all(&text, r#"$1"$2":"#).into_owned();

    // Regex literals last: the substitutions above never introduce bare
    // `/.../ ` sequences, so this can't misfire on an already-tagged value.
    text = REGEX_LITERAL
        .replace_all(&text, |caps: &regex::Captures| {
            let pattern = caps[1].replace('"', "\\\"");
            format!(r#"{{"{}":"{}","{}":"{}"}}"#, REGEX_TAG, pattern, REGEX_OPTIONS_TAG, &caps[2])
        })
        .into_owned();

    text
}

/// Convert single-quoted string literals to double-quoted, honoring
/// backslash escapes and leaving double-quoted strings untouched.
fn single_quotes_to_double(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0usize;
    let mut in_double = false;
    while i < chars.len() {
        let c = chars[i];
        if in_double {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_double = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_double = true;
                out.push(c);
                i += 1;
            }
            '\'' => {
                out.push('"');
                i += 1;
                while i < chars.len() {
                    let d = chars[i];
                    if d == '\\' && i + 1 < chars.len() {
                        out.push(d);
                        out.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    if d == '\'' {
                        i += 1;
                        break;
                    }
                    if d == '"' {
                        out.push('\\');
                        out.push('"');
                    } else {
                        out.push(d);
                    }
                    i += 1;
                }
                out.push('"');
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Recursively replace tagged markers with their revived shape.
/// For JSON-only consumers (tests, the validator) the revived shape is
/// still plain JSON; the Mongo adapter does a second revival pass from
/// JSON to `Bson` when building the driver document.
fn revive(value: Value) -> Value {
    match value {
        Value::Object(ref map) if map.len() == 1 && map.contains_key(OID_TAG) => value,
        Value::Object(ref map) if map.len() == 1 && map.contains_key(DATE_TAG) => value,
        Value::Object(ref map) if map.len() == 1 && map.contains_key(NUMBER_LONG_TAG) => value,
        Value::Object(ref map) if map.contains_key(REGEX_TAG) => value,
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, revive(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(revive).collect()),
        other => other,
    }
}

/// Is this JSON object one of the tagged BSON markers?
pub fn is_bson_marker(value: &Value) -> bool {
    if let Value::Object(map) = value {
        map.contains_key(OID_TAG)
            || map.contains_key(DATE_TAG)
            || map.contains_key(NUMBER_LONG_TAG)
            || map.contains_key(REGEX_TAG)
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_object_and_array() {
        let values = parse_mongo_args(r#"{age:{$gt:10}}, {name:1,_id:0}"#).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1]["name"], serde_json::json!(1));
    }

    #[test]
    fn revives_object_id() {
        let values = parse_mongo_args(r#"{_id: ObjectId("507f1f77bcf86cd799439011")}"#).unwrap();
        assert_eq!(values[0]["_id"][OID_TAG], serde_json::json!("507f1f77bcf86cd799439011"));
    }

    #[test]
    fn revives_iso_date_and_new_date() {
        let values = parse_mongo_args(r#"{at: ISODate("2024-01-01T00:00:00Z")}, {b: new Date("2024-01-02")}"#).unwrap();
        assert_eq!(values[0]["at"][DATE_TAG], serde_json::json!("2024-01-01T00:00:00Z"));
        assert_eq!(values[1]["b"][DATE_TAG], serde_json::json!("2024-01-02"));
    }

    #[test]
    fn revives_number_long_and_int() {
        let values = parse_mongo_args(r#"{a: NumberLong("123"), b: NumberInt(7)}"#).unwrap();
        assert_eq!(values[0]["a"][NUMBER_LONG_TAG], serde_json::json!("123"));
        assert_eq!(values[0]["b"], serde_json::json!(7));
    }

    #[test]
    fn revives_regex_literal() {
        let values = parse_mongo_args(r#"{name: /^a.*/i}"#).unwrap();
        assert_eq!(values[0]["name"][REGEX_TAG], serde_json::json!("^a.*"));
        assert_eq!(values[0]["name"][REGEX_OPTIONS_TAG], serde_json::json!("i"));
    }

    #[test]
    fn single_quotes_become_double() {
        let values = parse_mongo_args(r#"{'name': 'Alice'}"#).unwrap();
        assert_eq!(values[0]["name"], serde_json::json!("Alice"));
    }

    #[test]
    fn unquoted_keys_are_accepted() {
        let values = parse_mongo_args(r#"{name: "Alice", age: 30}"#).unwrap();
        assert_eq!(values[0]["age"], serde_json::json!(30));
    }

    #[test]
    fn empty_args_yield_empty_vec() {
        assert_eq!(parse_mongo_args("").unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn recovers_via_comma_split_on_partial_failure() {
        let values = split_top_level_commas(r#"{"a":1}, {"b":2}"#).unwrap();
        assert_eq!(values.len(), 2);
    }
}
