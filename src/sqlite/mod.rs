// ABOUTME: SQLite session backed by rusqlite, for local files and in-memory databases
// ABOUTME: Serializes concurrent record operations through a mutex around one connection

pub mod converter;

use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::sync::Mutex;

use crate::connection::{ConnectionDescriptor, ConnectionProvider};
use crate::error::DbError;
use crate::session::{Dialect, ExecOutcome, Record, Session};
use converter::{json_to_sqlite_value, sqlite_value_to_json};

/// A session over a single SQLite connection.
pub struct SqliteSession {
    conn: Mutex<Option<Connection>>,
}

impl SqliteSession {
    /// Open (or create) a SQLite database file.
    pub fn open(path: &str) -> Result<Self, DbError> {
        tracing::debug!("Opening SQLite database '{}'", path);
        let conn = Connection::open(path).map_err(map_sqlite_error)?;
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_error)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }

    /// Run one or more semicolon-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        self.with_conn(|conn| conn.execute_batch(sql))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, DbError> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| DbError::driver("SQLite connection lock poisoned"))?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| DbError::driver("SQLite connection already closed"))?;
        f(conn).map_err(map_sqlite_error)
    }

    fn take_conn(&self) -> Option<Connection> {
        match self.conn.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

#[async_trait]
impl Session for SqliteSession {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Record>, DbError> {
        let bound: Vec<_> = params.iter().map(json_to_sqlite_value).collect();

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            let mut rows = stmt.query(params_from_iter(bound))?;
            let mut records = Vec::new();

            while let Some(row) = rows.next()? {
                let mut record = Record::new();
                for (idx, name) in columns.iter().enumerate() {
                    let value: rusqlite::types::Value = row.get(idx)?;
                    record.insert(name.clone(), sqlite_value_to_json(&value));
                }
                records.push(record);
            }

            Ok(records)
        })
    }

    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<ExecOutcome, DbError> {
        let bound: Vec<_> = params.iter().map(json_to_sqlite_value).collect();
        let is_insert = sql.trim_start().to_ascii_uppercase().starts_with("INSERT");

        self.with_conn(|conn| {
            let affected = conn.execute(sql, params_from_iter(bound))?;
            let last_insert_id = if is_insert {
                u64::try_from(conn.last_insert_rowid()).ok()
            } else {
                None
            };

            Ok(ExecOutcome {
                affected_rows: affected as u64,
                last_insert_id,
            })
        })
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .map(|_| ())
    }

    async fn release(&self) -> Result<(), DbError> {
        match self.take_conn() {
            Some(conn) => conn.close().map_err(|(_, e)| map_sqlite_error(e)),
            None => Ok(()),
        }
    }

    async fn discard(&self) {
        drop(self.take_conn());
    }
}

/// Opens SQLite sessions; the descriptor's `database` field is the file path.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteProvider;

#[async_trait]
impl ConnectionProvider for SqliteProvider {
    type Session = SqliteSession;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<SqliteSession, DbError> {
        let path = descriptor.params.database.as_str();
        if path == ":memory:" {
            SqliteSession::open_in_memory()
        } else {
            SqliteSession::open(path)
        }
    }
}

/// Map a rusqlite error to its extended result code
fn map_sqlite_error(err: rusqlite::Error) -> DbError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            DbError::new(i64::from(failure.extended_code), err.to_string())
        }
        _ => DbError::driver(err.to_string()),
    }
}
