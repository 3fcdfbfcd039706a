//! JSON export sink, per 4.10: a single top-level array of row objects
//! in rendered order.

use crate::adapters::QueryResult;
use crate::error::Result;

pub fn render(result: &QueryResult) -> Result<Vec<u8>> {
    let rows: Vec<&std::collections::BTreeMap<String, serde_json::Value>> = result.rows.iter().collect();
    Ok(serde_json::to_vec(&rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn renders_rows_as_a_top_level_array() {
        let mut row = BTreeMap::new();
        row.insert("name".to_string(), serde_json::json!("Alice"));
        let result = QueryResult { rows: vec![row], columns: vec![], row_count: 1, execution_time_ms: 0 };
        let bytes = render(&result).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["name"], "Alice");
    }

    #[test]
    fn empty_result_renders_empty_array() {
        let result = QueryResult::empty();
        let bytes = render(&result).unwrap();
        assert_eq!(bytes, b"[]");
    }
}
