// ABOUTME: MySQL session backed by mysql_async, one connection per operation
// ABOUTME: Serializes concurrent record statements through an async mutex

pub mod converter;

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, Params};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::connection::{ConnectionDescriptor, ConnectionProvider};
use crate::error::DbError;
use crate::session::{Dialect, ExecOutcome, Record, Session};
use converter::{json_to_mysql_value, mysql_value_to_json};

/// A session over a single MySQL connection.
///
/// The connection is held behind an async mutex for the whole duration of a
/// statement, so concurrent callers queue up instead of interleaving packets.
pub struct MySqlSession {
    conn: Mutex<Option<Conn>>,
}

impl MySqlSession {
    pub fn new(conn: Conn) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }
}

fn to_params(params: Vec<Value>) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(json_to_mysql_value).collect())
    }
}

fn closed() -> DbError {
    DbError::driver("MySQL connection already closed")
}

#[async_trait]
impl Session for MySqlSession {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Record>, DbError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed)?;

        let rows: Vec<mysql_async::Row> = conn
            .exec(sql, to_params(params))
            .await
            .map_err(map_mysql_error)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let columns = row.columns();
                let mut record = Record::new();
                for (idx, column) in columns.iter().enumerate() {
                    let value = row
                        .as_ref(idx)
                        .map(mysql_value_to_json)
                        .unwrap_or(Value::Null);
                    record.insert(column.name_str().into_owned(), value);
                }
                record
            })
            .collect())
    }

    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<ExecOutcome, DbError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed)?;

        conn.exec_drop(sql, to_params(params))
            .await
            .map_err(map_mysql_error)?;

        Ok(ExecOutcome {
            affected_rows: conn.affected_rows(),
            last_insert_id: conn.last_insert_id().filter(|id| *id > 0),
        })
    }

    async fn ping(&self) -> Result<(), DbError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed)?;
        conn.ping().await.map_err(map_mysql_error)
    }

    async fn release(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().await.take();
        match conn {
            Some(conn) => conn.disconnect().await.map_err(map_mysql_error),
            None => Ok(()),
        }
    }

    async fn discard(&self) {
        // Dropping a non-pooled Conn hands the close to a task spawned by
        // mysql_async; this returns without waiting for the server.
        drop(self.conn.lock().await.take());
    }
}

/// Opens MySQL sessions from a descriptor.
#[derive(Debug, Clone)]
pub struct MySqlProvider {
    connect_timeout: Duration,
}

impl MySqlProvider {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for MySqlProvider {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl ConnectionProvider for MySqlProvider {
    type Session = MySqlSession;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<MySqlSession, DbError> {
        let params = &descriptor.params;
        tracing::debug!("Connecting to MySQL at {}", descriptor.display_target());

        let opts = OptsBuilder::default()
            .ip_or_hostname(params.host.clone())
            .tcp_port(params.port)
            .user(Some(params.user.clone()))
            .pass(Some(descriptor.secrets.password.clone()))
            .db_name(Some(params.database.clone()))
            // affected_rows must count matched rows, or a no-op update reads as missing
            .client_found_rows(true);

        let conn = tokio::time::timeout(self.connect_timeout, Conn::new(opts))
            .await
            .map_err(|_| {
                DbError::driver(format!(
                    "Timed out after {:?} connecting to {}",
                    self.connect_timeout,
                    descriptor.display_target()
                ))
            })?
            .map_err(map_mysql_error)?;

        Ok(MySqlSession::new(conn))
    }
}

/// Map a driver error to the server errno when there is one
fn map_mysql_error(err: mysql_async::Error) -> DbError {
    match &err {
        mysql_async::Error::Server(server) => DbError::new(i64::from(server.code), err.to_string()),
        _ => DbError::driver(err.to_string()),
    }
}
