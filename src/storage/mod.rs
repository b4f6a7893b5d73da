//! Relational score storage.
//!
//! The rest of the crate talks to the database only through [`ScoreStore`]:
//! parameterized statements in, rows as column-name maps out. User input is
//! always bound as a positional [`SqlParam`], never spliced into SQL text.

pub mod sqlite;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use sqlite::SqliteStore;

/// A result row keyed by column name.
pub type Row = Map<String, Value>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database connection lock poisoned")]
    Poisoned,

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Invalid database url: {0}")]
    InvalidUrl(String),
}

/// Positional statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::Real(v)
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

/// Query execution capability backing every endpoint.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Create the `scores` table and its indexes if absent.
    ///
    /// Safe to call on every request; after the first success it is a no-op.
    async fn ensure_schema(&self) -> Result<(), StorageError>;

    /// Run a statement that returns rows.
    async fn query(&self, sql: &str, params: Vec<SqlParam>) -> Result<Vec<Row>, StorageError>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: Vec<SqlParam>) -> Result<usize, StorageError>;
}

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Memory,
    File(std::path::PathBuf),
}

impl DatabaseTarget {
    /// Parse a connection string.
    ///
    /// Accepts `sqlite://<path>`, `sqlite:<path>`, a bare path, or `:memory:`.
    pub fn parse(url: &str) -> Result<Self, StorageError> {
        let url = url.trim();
        let rest = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);

        if rest.is_empty() {
            return Err(StorageError::InvalidUrl(url.to_string()));
        }
        if rest == ":memory:" {
            return Ok(DatabaseTarget::Memory);
        }
        if rest.contains("://") {
            return Err(StorageError::InvalidUrl(url.to_string()));
        }
        Ok(DatabaseTarget::File(rest.into()))
    }
}

/// Read an integer column from a row, 0 when absent.
pub fn count_from_rows(rows: &[Row], column: &str) -> usize {
    rows.first()
        .and_then(|r| r.get(column))
        .and_then(Value::as_u64)
        .map(|c| c as usize)
        .unwrap_or(0)
}
