//! Database access seam: one narrow query capability over an embedded engine.

#[cfg(feature = "duckdb")]
mod duckdb;

#[cfg(feature = "duckdb")]
pub use duckdb::DuckdbConnection;

use thiserror::Error;

/// One result row with every value rendered to text. `None` is SQL NULL.
pub type Row = Vec<Option<String>>;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to open database at {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("query failed: {reason}")]
    Query { reason: String },
}

impl ConnectionError {
    pub fn query(reason: impl Into<String>) -> Self {
        ConnectionError::Query {
            reason: reason.into(),
        }
    }
}

/// The single capability the catalog needs from a database.
///
/// Implementations execute synchronously; async callers wrap calls in
/// `tokio::task::spawn_blocking`.
pub trait Connection: Send + Sync {
    fn query(&self, sql: &str) -> Result<Vec<Row>, ConnectionError>;

    /// First row of a statement, if any.
    fn query_row(&self, sql: &str) -> Result<Option<Row>, ConnectionError> {
        Ok(self.query(sql)?.into_iter().next())
    }
}
