//! CSV export sink, per 4.10.

use std::collections::BTreeSet;

use crate::adapters::QueryResult;
use crate::error::Result;

pub fn render(result: &QueryResult) -> Result<Vec<u8>> {
    let headers = declared_or_union_headers(result);

    let mut writer = ::csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(&headers).map_err(|e| crate::error::GatewayError::server(e.to_string()))?;

    for row in &result.rows {
        let record: Vec<String> = headers.iter().map(|h| cell(row.get(h))).collect();
        writer.write_record(&record).map_err(|e| crate::error::GatewayError::server(e.to_string()))?;
    }

    writer.into_inner().map_err(|e| crate::error::GatewayError::server(e.to_string()))
}

fn declared_or_union_headers(result: &QueryResult) -> Vec<String> {
    if !result.columns.is_empty() {
        return result.columns.iter().map(|c| c.name.clone()).collect();
    }
    let mut union = BTreeSet::new();
    for row in &result.rows {
        union.extend(row.keys().cloned());
    }
    union.into_iter().collect()
}

/// Coerce one cell to its CSV string form. Quoting/escaping of commas,
/// quotes, and newlines is handled by the `csv` writer itself.
fn cell(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ColumnInfo;
    use std::collections::BTreeMap;

    fn row(pairs: &[(&str, serde_json::Value)]) -> BTreeMap<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn uses_declared_columns_as_header() {
        let result = QueryResult {
            rows: vec![row(&[("name", serde_json::json!("Alice")), ("age", serde_json::json!(30))])],
            columns: vec![
                ColumnInfo { name: "name".into(), type_name: "string".into() },
                ColumnInfo { name: "age".into(), type_name: "number".into() },
            ],
            row_count: 1,
            execution_time_ms: 0,
        };
        let bytes = render(&result).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "name,age\nAlice,30\n");
    }

    #[test]
    fn falls_back_to_union_of_keys_without_declared_columns() {
        let result = QueryResult {
            rows: vec![
                row(&[("a", serde_json::json!(1))]),
                row(&[("b", serde_json::json!(2))]),
            ],
            columns: vec![],
            row_count: 2,
            execution_time_ms: 0,
        };
        let bytes = render(&result).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("a,b"));
    }

    #[test]
    fn escapes_commas_quotes_and_newlines() {
        let result = QueryResult {
            rows: vec![row(&[("text", serde_json::json!("Hello, \"world\"\nagain"))])],
            columns: vec![ColumnInfo { name: "text".into(), type_name: "string".into() }],
            row_count: 1,
            execution_time_ms: 0,
        };
        let bytes = render(&result).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"Hello, \"\"world\"\"\nagain\""));
    }

    #[test]
    fn objects_render_as_canonical_json() {
        let result = QueryResult {
            rows: vec![row(&[("meta", serde_json::json!({"a": 1}))])],
            columns: vec![ColumnInfo { name: "meta".into(), type_name: "object".into() }],
            row_count: 1,
            execution_time_ms: 0,
        };
        let bytes = render(&result).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("{\"a\":1}"));
    }
}
