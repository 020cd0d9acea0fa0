// ABOUTME: Session abstraction over a single live database connection
// ABOUTME: Defines the query/execute primitives and per-dialect SQL rendering

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::DbError;
use crate::utils::{quote_ident, quote_mysql_ident};

/// A row or input record: column name to value.
pub type Record = Map<String, Value>;

/// Outcome of a data-modifying statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub affected_rows: u64,
    /// Identity generated (or explicitly stored) by an INSERT, if the driver reports one
    pub last_insert_id: Option<u64>,
}

/// SQL dialect spoken by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Sqlite,
}

impl Dialect {
    /// Quote an identifier for this dialect
    pub fn quote(self, identifier: &str) -> String {
        match self {
            Dialect::MySql => quote_mysql_ident(identifier),
            Dialect::Sqlite => quote_ident(identifier),
        }
    }
}

/// One live connection, owned by exactly one top-level operation.
///
/// Implementations must tolerate concurrent calls through `&self` and
/// serialize them onto the underlying connection. No record-level operation
/// depends on another's result, so no further locking is needed by callers.
#[async_trait]
pub trait Session: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Run a statement that returns rows. Parameters bind to `?` placeholders in order.
    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Record>, DbError>;

    /// Run a data-modifying statement.
    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<ExecOutcome, DbError>;

    /// Round-trip check without touching any table.
    async fn ping(&self) -> Result<(), DbError>;

    /// Gracefully close the connection. Called after a successful operation.
    async fn release(&self) -> Result<(), DbError>;

    /// Drop the connection without a close handshake. Called on failure paths,
    /// where the connection may be half-open.
    async fn discard(&self);
}
