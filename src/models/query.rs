use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::connection::ConnectionInfo;
use super::metadata::SchemaSnapshot;

/// One result row: column name to scalar value, in driver column order
pub type Record = Map<String, Value>;

/// Natural language query request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(alias = "question")]
    pub query: String,
    pub timeout_secs: Option<u64>,
}

/// Rows and column names as reported by a driver
#[derive(Debug, Clone, Default)]
pub struct RawRows {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

/// Result of executing a statement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(sql: impl Into<String>, raw: RawRows, execution_time_ms: u64) -> Self {
        Self {
            sql: sql.into(),
            row_count: raw.rows.len(),
            columns: raw.columns,
            rows: raw.rows,
            execution_time_ms,
        }
    }
}

/// Answer to a natural language query: the executed result plus the unverified candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnswer {
    pub candidate_sql: String,
    #[serde(flatten)]
    pub result: QueryResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub connection: ConnectionInfo,
    pub summary: Option<String>,
    pub schema: SchemaSnapshot,
}
