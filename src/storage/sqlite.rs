//! SQLite-backed score store.
//!
//! A single connection is shared behind a mutex; every statement runs on the
//! blocking pool so handlers never stall the async runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use serde_json::Value;
use tracing::{debug, info};

use super::{DatabaseTarget, Row, ScoreStore, SqlParam, StorageError};

/// Default busy timeout (ms).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Unicode-aware lowercase, registered on every connection. The built-in
/// `LOWER`/`UPPER`/`LIKE` only fold ASCII.
pub const UNICODE_LOWER: &str = "unicode_lower";

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS scores (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        player_id TEXT NOT NULL,
        name TEXT NOT NULL,
        class_name TEXT NOT NULL,
        points INTEGER NOT NULL,
        attempts INTEGER NOT NULL,
        correct INTEGER NOT NULL,
        accuracy INTEGER NOT NULL,
        best_streak INTEGER NOT NULL,
        max_factor INTEGER NOT NULL,
        elapsed_sec REAL NOT NULL,
        avg_sec REAL NOT NULL,
        reason_text TEXT NOT NULL,
        mistakes TEXT NOT NULL,
        slowest_correct TEXT NOT NULL,
        created_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
    );
    CREATE INDEX IF NOT EXISTS scores_player_id_idx ON scores (player_id);
    CREATE INDEX IF NOT EXISTS scores_points_idx ON scores (points DESC);
";

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlParam::Int(v) => ToSqlOutput::from(*v),
            SqlParam::Real(v) => ToSqlOutput::from(*v),
            SqlParam::Text(v) => ToSqlOutput::from(v.as_str()),
        })
    }
}

/// Score store over a single SQLite connection.
#[derive(Clone)]
pub struct SqliteStore {
    connection: Arc<Mutex<Connection>>,
    /// Flips to true once the schema has been created; never reset.
    schema_ready: Arc<AtomicBool>,
}

impl SqliteStore {
    /// Open a store from a connection string (see [`DatabaseTarget::parse`]).
    pub fn open(url: &str, busy_timeout_ms: u64) -> Result<Self, StorageError> {
        let connection = match DatabaseTarget::parse(url)? {
            DatabaseTarget::Memory => Connection::open_in_memory()?,
            DatabaseTarget::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let connection = Connection::open(&path)?;
                connection.execute_batch("PRAGMA journal_mode = WAL;")?;
                info!("Opened score database at {:?}", path);
                connection
            }
        };
        connection.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        Self::from_connection(connection)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self, StorageError> {
        register_functions(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            schema_ready: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let guard = connection.lock().map_err(|_| StorageError::Poisoned)?;
            f(&guard).map_err(StorageError::from)
        })
        .await?
    }
}

fn register_functions(connection: &Connection) -> rusqlite::Result<()> {
    connection.create_scalar_function(
        UNICODE_LOWER,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| match ctx.get_raw(0) {
            ValueRef::Null => Ok(None),
            ValueRef::Text(bytes) => Ok(Some(String::from_utf8_lossy(bytes).to_lowercase())),
            ValueRef::Integer(i) => Ok(Some(i.to_string())),
            ValueRef::Real(f) => Ok(Some(f.to_string())),
            ValueRef::Blob(_) => Err(rusqlite::Error::UserFunctionError(
                "unicode_lower does not accept blobs".into(),
            )),
        },
    )
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

#[async_trait]
impl ScoreStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn ensure_schema(&self) -> Result<(), StorageError> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        // Racing first requests may both get here; CREATE ... IF NOT EXISTS is idempotent.
        self.run(|conn| conn.execute_batch(SCHEMA_SQL)).await?;
        self.schema_ready.store(true, Ordering::Release);
        info!("Score schema ready");
        Ok(())
    }

    async fn query(&self, sql: &str, params: Vec<SqlParam>) -> Result<Vec<Row>, StorageError> {
        let sql = sql.to_string();
        let rows = self
            .run(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let columns: Vec<String> =
                    stmt.column_names().iter().map(|c| c.to_string()).collect();
                let mut rows = stmt.query(params_from_iter(params.iter()))?;

                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let mut map = Row::new();
                    for (i, column) in columns.iter().enumerate() {
                        map.insert(column.clone(), to_json(row.get_ref(i)?));
                    }
                    out.push(map);
                }
                Ok(out)
            })
            .await?;
        debug!("Query returned {} rows", rows.len());
        Ok(rows)
    }

    async fn execute(&self, sql: &str, params: Vec<SqlParam>) -> Result<usize, StorageError> {
        let sql = sql.to_string();
        self.run(move |conn| conn.execute(&sql, params_from_iter(params.iter())))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_schema_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();

        let rows = store
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'scores' \
                 ORDER BY name",
                vec![],
            )
            .await
            .unwrap();
        let names: Vec<&str> = rows.iter().filter_map(|r| r["name"].as_str()).collect();
        assert!(names.contains(&"scores_player_id_idx"));
        assert!(names.contains(&"scores_points_idx"));
    }

    #[tokio::test]
    async fn test_schema_creation_is_safe_to_repeat_directly() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.execute(SCHEMA_SQL.split(';').next().unwrap(), vec![]).await.unwrap();
        // Latch is still unset, the full batch must tolerate existing objects.
        store.ensure_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_query_maps_columns_and_types() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rows = store
            .query(
                "SELECT ?1 AS i, ?2 AS r, ?3 AS t, NULL AS n",
                vec![SqlParam::Int(7), SqlParam::Real(2.5), "hello".into()],
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["i"], Value::from(7));
        assert_eq!(rows[0]["r"], Value::from(2.5));
        assert_eq!(rows[0]["t"], Value::from("hello"));
        assert_eq!(rows[0]["n"], Value::Null);
    }

    #[tokio::test]
    async fn test_params_are_bound_not_interpolated() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_schema().await.unwrap();

        let hostile = "x'); DROP TABLE scores; --";
        let rows = store
            .query(
                "SELECT COUNT(*) AS c FROM scores WHERE player_id = ?1",
                vec![hostile.into()],
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["c"], Value::from(0));

        let still_there = store
            .query("SELECT COUNT(*) AS c FROM scores", vec![])
            .await
            .unwrap();
        assert_eq!(still_there[0]["c"], Value::from(0));
    }

    #[tokio::test]
    async fn test_file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scores.db");
        let url = format!("sqlite://{}", path.display());

        {
            let store = SqliteStore::open(&url, DEFAULT_BUSY_TIMEOUT_MS).unwrap();
            store.ensure_schema().await.unwrap();
            let inserted = store
                .execute(
                    "INSERT INTO scores (player_id, name, class_name, points, attempts, correct, \
                     accuracy, best_streak, max_factor, elapsed_sec, avg_sec, reason_text, \
                     mistakes, slowest_correct) \
                     VALUES ('p1', 'Ada', '5B', 1, 1, 1, 100, 1, 10, 1.0, 1.0, 'done', '[]', '[]')",
                    vec![],
                )
                .await
                .unwrap();
            assert_eq!(inserted, 1);
        }

        let store = SqliteStore::open(&url, DEFAULT_BUSY_TIMEOUT_MS).unwrap();
        store.ensure_schema().await.unwrap();
        let rows = store
            .query("SELECT player_id, created_at FROM scores", vec![])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["player_id"], Value::from("p1"));
        assert!(rows[0]["created_at"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_unicode_lower_folds_non_ascii() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rows = store
            .query(
                "SELECT unicode_lower(?1) AS folded, LOWER(?1) AS ascii_only, \
                 unicode_lower(NULL) AS missing",
                vec!["ØYVIND Åsne".into()],
            )
            .await
            .unwrap();

        assert_eq!(rows[0]["folded"], Value::from("øyvind åsne"));
        assert_eq!(rows[0]["ascii_only"], Value::from("Øyvind Åsne"));
        assert_eq!(rows[0]["missing"], Value::Null);
    }
}
