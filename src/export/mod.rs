//! Result export streaming, per 4.10.
//!
//! Adapted from the teacher's file-based export writers: here the sink
//! is an in-memory buffer handed straight to the HTTP response body
//! rather than a file on disk.

pub mod csv;
pub mod json;

use crate::adapters::QueryResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
        }
    }
}

/// Render a [`QueryResult`] into the requested wire format.
pub fn render(result: &QueryResult, format: ExportFormat) -> crate::error::Result<Vec<u8>> {
    match format {
        ExportFormat::Csv => csv::render(result),
        ExportFormat::Json => json::render(result),
    }
}
