use crate::types::{Params, QueryResult, Value};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::fs::File;

/// The generated statement and its bound values
#[derive(Debug, Clone, Serialize)]
pub struct QueryEcho {
    pub sql: String,
    pub params: Params,
}

/// One page of a table or view
#[derive(Debug, Clone, Serialize)]
pub struct TablePage {
    pub database: String,
    pub table: String,
    pub is_view: bool,
    pub view_definition: Option<String>,
    pub table_definition: Option<String>,
    #[serde(flatten)]
    pub result: QueryResult,
    /// Row count recorded at inspection; `None` for views
    pub table_row_count: Option<u64>,
    pub primary_keys: Vec<String>,
    pub use_rowid: bool,
    pub query: QueryEcho,
    pub next_cursor: Option<String>,
    /// Query string for the following page
    pub next_url: Option<String>,
    pub query_ms: f64,
}

/// Result of a caller-supplied SELECT
#[derive(Debug, Clone, Serialize)]
pub struct CustomQueryPage {
    pub database: String,
    #[serde(flatten)]
    pub result: QueryResult,
    /// The SQL as submitted and the value used for each `:named` parameter
    pub query: QueryEcho,
    pub query_ms: f64,
}

/// A single row looked up by its key path
#[derive(Debug, Clone, Serialize)]
pub struct RowPage {
    pub database: String,
    pub table: String,
    #[serde(flatten)]
    pub result: QueryResult,
    pub primary_keys: Vec<String>,
    /// Decoded key values, numbers as numbers
    pub primary_key_values: Vec<Value>,
    pub query_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableOverview {
    pub name: String,
    pub columns: Vec<String>,
    pub table_rows: Option<u64>,
}

/// Tables and views of one database
#[derive(Debug, Clone, Serialize)]
pub struct DatabasePage {
    pub database: String,
    pub hash: String,
    pub tables: Vec<TableOverview>,
    pub views: Vec<String>,
}

/// The raw database file, opened for streaming
#[derive(Debug)]
pub struct Download {
    pub filename: String,
    pub len: u64,
    pub file: File,
}

impl Download {
    pub fn content_disposition(&self) -> String {
        format!(
            "attachment; filename=\"{}\"",
            self.filename.replace(['"', '\\'], "_")
        )
    }
}

/// Pages that carry a result and can be shaped as row objects
pub trait HasResult {
    fn result(&self) -> &QueryResult;

    fn rows_as_objects(&self) -> Vec<Map<String, JsonValue>> {
        self.result().rows_as_objects()
    }
}

impl HasResult for TablePage {
    fn result(&self) -> &QueryResult {
        &self.result
    }
}

impl HasResult for CustomQueryPage {
    fn result(&self) -> &QueryResult {
        &self.result
    }
}

impl HasResult for RowPage {
    fn result(&self) -> &QueryResult {
        &self.result
    }
}
