//! The executor boundary: the external collaborator that actually runs
//! SQL against the warehouse.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// One result row: column name to value.
pub type Row = BTreeMap<String, Value>;

/// What the warehouse returned for one statement. An empty `rows` is a
/// valid result, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub elapsed: Duration,
}

impl QueryResult {
    pub fn from_rows(rows: Vec<Row>, elapsed: Duration) -> Self {
        let row_count = rows.len();
        Self {
            rows,
            row_count,
            elapsed,
        }
    }
}

/// Execution failure, as reported by the external executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("query failed: {0}")]
    Failed(String),

    #[error("connection to warehouse lost: {0}")]
    ConnectionLost(String),
}

/// Executes compiled SQL against the warehouse. Implemented outside
/// this crate; injected into the orchestrator.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryResult, ExecutionError>;
}
