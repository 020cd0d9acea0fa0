// ABOUTME: Catalog lookups that resolve a table's key column by attribute
// ABOUTME: Ambiguous or missing matches are configuration errors, not transient faults

use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::session::{Dialect, Session};

/// Column attribute used to pick a table's key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAttribute {
    /// MySQL `AUTO_INCREMENT`; in SQLite, the `INTEGER PRIMARY KEY` rowid alias
    AutoIncrement,
    /// Single-column primary key
    PrimaryKey,
}

impl ColumnAttribute {
    fn describe(self) -> &'static str {
        match self {
            ColumnAttribute::AutoIncrement => "auto-increment",
            ColumnAttribute::PrimaryKey => "primary key",
        }
    }
}

/// Build the catalog query returning the names of matching columns.
/// The table name is the only bound parameter.
fn catalog_query(dialect: Dialect, attribute: ColumnAttribute) -> &'static str {
    match (dialect, attribute) {
        (Dialect::MySql, ColumnAttribute::AutoIncrement) => {
            "SELECT COLUMN_NAME AS name
             FROM INFORMATION_SCHEMA.COLUMNS
             WHERE TABLE_SCHEMA = DATABASE()
               AND TABLE_NAME = ?
               AND EXTRA LIKE '%auto_increment%'"
        }
        (Dialect::MySql, ColumnAttribute::PrimaryKey) => {
            "SELECT COLUMN_NAME AS name
             FROM INFORMATION_SCHEMA.COLUMNS
             WHERE TABLE_SCHEMA = DATABASE()
               AND TABLE_NAME = ?
               AND COLUMN_KEY = 'PRI'"
        }
        (Dialect::Sqlite, ColumnAttribute::AutoIncrement) => {
            "SELECT name FROM pragma_table_info(?1)
             WHERE pk = 1
               AND upper(type) = 'INTEGER'
               AND (SELECT count(*) FROM pragma_table_info(?1) WHERE pk > 0) = 1"
        }
        (Dialect::Sqlite, ColumnAttribute::PrimaryKey) => {
            "SELECT name FROM pragma_table_info(?1) WHERE pk > 0"
        }
    }
}

/// Resolve the single column of `table` carrying `attribute`.
///
/// Fails with [`SyncError::Schema`] when no column or more than one column
/// matches. Catalog query failures surface as [`SyncError::Database`].
pub async fn resolve_column_by_attribute<S: Session + ?Sized>(
    session: &S,
    table: &str,
    attribute: ColumnAttribute,
) -> Result<String> {
    let sql = catalog_query(session.dialect(), attribute);
    tracing::debug!("Resolving {} column of '{}'", attribute.describe(), table);

    let rows = session
        .query(sql, vec![Value::String(table.to_string())])
        .await?;

    let mut names: Vec<String> = rows
        .iter()
        .filter_map(|row| row.get("name").and_then(Value::as_str))
        .map(String::from)
        .collect();

    match names.len() {
        1 => Ok(names.remove(0)),
        0 => Err(SyncError::schema(format!(
            "table '{}' has no {} column",
            table,
            attribute.describe()
        ))),
        n => Err(SyncError::schema(format!(
            "table '{}' has {} {} columns ({}); expected exactly one",
            table,
            n,
            attribute.describe(),
            names.join(", ")
        ))),
    }
}
