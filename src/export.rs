// ABOUTME: Exporter - reads one bounded page of rows past a key cursor
// ABOUTME: Supports all/once/delta/test selection and marks rows processed in once mode

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{ExportConfiguration, ExportMode};
use crate::error::{Result, SyncError};
use crate::schema::{resolve_column_by_attribute, ColumnAttribute};
use crate::session::{Dialect, Record, Session};

/// Most keys bound into one mark-as-processed statement
pub const MARK_CHUNK_SIZE: usize = 1000;

/// Resumption marker carried between export calls.
///
/// The caller persists it; the engine only computes the next value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportState {
    /// Key value of the last row already exported
    #[serde(default)]
    pub start_index: i64,
}

impl ExportState {
    pub fn new(start_index: i64) -> Self {
        Self { start_index }
    }
}

/// One page of exported rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPage {
    pub data: Vec<Record>,
    pub last_page: bool,
    /// Cursor for the next call; absent for test mode and empty pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ExportState>,
}

impl ExportPage {
    /// A terminal page that cannot be resumed
    fn terminal(data: Vec<Record>) -> Self {
        Self {
            data,
            last_page: true,
            state: None,
        }
    }
}

/// Reads pages from a single table through one session.
pub struct Exporter<'a, S: Session + ?Sized> {
    session: &'a S,
}

impl<'a, S: Session + ?Sized> Exporter<'a, S> {
    pub fn new(session: &'a S) -> Self {
        Self { session }
    }

    /// Export the next page after `state`.
    ///
    /// In `once` mode the returned rows are flagged as processed before this
    /// returns; a flag update touching a different number of rows than were
    /// read fails the whole call with [`SyncError::InconsistentUpdate`].
    pub async fn export(
        &self,
        config: &ExportConfiguration,
        state: &ExportState,
    ) -> Result<ExportPage> {
        let key_column =
            resolve_column_by_attribute(self.session, &config.table, ColumnAttribute::AutoIncrement)
                .await?;

        let (sql, params) =
            build_page_query(self.session.dialect(), config, &key_column, state.start_index);
        debug!("Export page query: {}", sql);

        let rows = self.session.query(&sql, params).await?;

        if matches!(config.mode, ExportMode::Test) || rows.is_empty() {
            info!(
                "Exported {} rows from '{}' (final page)",
                rows.len(),
                config.table
            );
            return Ok(ExportPage::terminal(rows));
        }

        let next_index = cursor_from_page(&rows, &key_column)?;

        if let ExportMode::Once { boolean_field } = &config.mode {
            self.mark_processed(&config.table, &key_column, boolean_field, &rows)
                .await?;
        }

        let last_page = (rows.len() as u64) < config.page_size;
        info!(
            "Exported {} rows from '{}' (next startIndex {}, last page: {})",
            rows.len(),
            config.table,
            next_index,
            last_page
        );

        Ok(ExportPage {
            data: rows,
            last_page,
            state: Some(ExportState::new(next_index)),
        })
    }

    /// Set the flag column on exactly the rows just read.
    ///
    /// Keys are bound in chunks of [`MARK_CHUNK_SIZE`] so large pages stay
    /// under the drivers' bound-parameter limits.
    async fn mark_processed(
        &self,
        table: &str,
        key_column: &str,
        boolean_field: &str,
        rows: &[Record],
    ) -> Result<()> {
        let keys: Vec<Value> = rows
            .iter()
            .map(|row| row.get(key_column).cloned().unwrap_or(Value::Null))
            .collect();

        let mut affected = 0u64;
        for chunk in keys.chunks(MARK_CHUNK_SIZE) {
            let sql = build_mark_query(
                self.session.dialect(),
                table,
                key_column,
                boolean_field,
                chunk.len(),
            );
            debug!("Export mark query ({} keys): {}", chunk.len(), sql);

            let outcome = self.session.execute(&sql, chunk.to_vec()).await?;
            affected += outcome.affected_rows;
        }

        let expected = rows.len() as u64;
        if affected != expected {
            return Err(SyncError::InconsistentUpdate {
                expected,
                actual: affected,
            });
        }

        Ok(())
    }
}

/// Build the page query for a mode.
///
/// Every mode starts from `SELECT * FROM <table> WHERE <key> > ?`.
fn build_page_query(
    dialect: Dialect,
    config: &ExportConfiguration,
    key_column: &str,
    start_index: i64,
) -> (String, Vec<Value>) {
    let key = dialect.quote(key_column);
    let mut sql = format!(
        "SELECT * FROM {} WHERE {} > ?",
        dialect.quote(&config.table),
        key
    );
    let mut params = vec![Value::from(start_index)];

    match &config.mode {
        ExportMode::All => {}
        ExportMode::Once { boolean_field } => {
            sql.push_str(&format!(" AND {} = 0", dialect.quote(boolean_field)));
        }
        ExportMode::Delta {
            date_field,
            last_execution_time,
        } => {
            sql.push_str(&format!(" AND {} > ?", dialect.quote(date_field)));
            params.push(last_execution_time.clone());
        }
        ExportMode::Test => {
            sql.push_str(" LIMIT 1");
            return (sql, params);
        }
    }

    sql.push_str(&format!(" ORDER BY {} LIMIT ?", key));
    params.push(Value::from(config.page_size));
    (sql, params)
}

fn build_mark_query(
    dialect: Dialect,
    table: &str,
    key_column: &str,
    boolean_field: &str,
    key_count: usize,
) -> String {
    let placeholders = vec!["?"; key_count].join(", ");
    format!(
        "UPDATE {} SET {} = 1 WHERE {} IN ({})",
        dialect.quote(table),
        dialect.quote(boolean_field),
        dialect.quote(key_column),
        placeholders
    )
}

/// Next cursor: the key of the last row in the page.
fn cursor_from_page(rows: &[Record], key_column: &str) -> Result<i64> {
    let last = rows
        .last()
        .ok_or_else(|| SyncError::InvalidCursor("page is empty".to_string()))?;

    match last.get(key_column) {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            SyncError::InvalidCursor(format!("key '{}' value {} is not an i64", key_column, n))
        }),
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| {
            SyncError::InvalidCursor(format!("key '{}' value '{}' is not numeric", key_column, s))
        }),
        Some(other) => Err(SyncError::InvalidCursor(format!(
            "key '{}' value {} is not numeric",
            key_column, other
        ))),
        None => Err(SyncError::InvalidCursor(format!(
            "page rows do not contain key column '{}'",
            key_column
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(mode: ExportMode) -> ExportConfiguration {
        ExportConfiguration {
            table: "orders".to_string(),
            page_size: 50,
            mode,
        }
    }

    fn row(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_page_query_all() {
        let (sql, params) = build_page_query(Dialect::MySql, &config(ExportMode::All), "id", 7);
        assert_eq!(
            sql,
            "SELECT * FROM `orders` WHERE `id` > ? ORDER BY `id` LIMIT ?"
        );
        assert_eq!(params, vec![json!(7), json!(50)]);
    }

    #[test]
    fn test_page_query_once() {
        let (sql, params) = build_page_query(
            Dialect::MySql,
            &config(ExportMode::Once {
                boolean_field: "exported".to_string(),
            }),
            "id",
            0,
        );
        assert_eq!(
            sql,
            "SELECT * FROM `orders` WHERE `id` > ? AND `exported` = 0 ORDER BY `id` LIMIT ?"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_page_query_delta() {
        let (sql, params) = build_page_query(
            Dialect::Sqlite,
            &config(ExportMode::Delta {
                date_field: "updated_at".to_string(),
                last_execution_time: json!("2024-05-01 00:00:00"),
            }),
            "id",
            3,
        );
        assert_eq!(
            sql,
            "SELECT * FROM \"orders\" WHERE \"id\" > ? AND \"updated_at\" > ? ORDER BY \"id\" LIMIT ?"
        );
        assert_eq!(
            params,
            vec![json!(3), json!("2024-05-01 00:00:00"), json!(50)]
        );
    }

    #[test]
    fn test_page_query_test_mode() {
        let (sql, params) = build_page_query(Dialect::MySql, &config(ExportMode::Test), "id", 0);
        assert_eq!(sql, "SELECT * FROM `orders` WHERE `id` > ? LIMIT 1");
        assert_eq!(params, vec![json!(0)]);
    }

    #[test]
    fn test_mark_query() {
        let sql = build_mark_query(Dialect::MySql, "orders", "id", "exported", 3);
        assert_eq!(
            sql,
            "UPDATE `orders` SET `exported` = 1 WHERE `id` IN (?, ?, ?)"
        );
    }

    #[test]
    fn test_cursor_uses_last_row() {
        let rows = vec![row(json!({"id": 4})), row(json!({"id": 9}))];
        assert_eq!(cursor_from_page(&rows, "id").unwrap(), 9);
    }

    #[test]
    fn test_cursor_accepts_numeric_strings() {
        let rows = vec![row(json!({"id": "12"}))];
        assert_eq!(cursor_from_page(&rows, "id").unwrap(), 12);
    }

    #[test]
    fn test_cursor_rejects_non_numeric_keys() {
        let rows = vec![row(json!({"id": "abc"}))];
        assert!(matches!(
            cursor_from_page(&rows, "id"),
            Err(SyncError::InvalidCursor(_))
        ));

        let rows = vec![row(json!({"other": 1}))];
        assert!(matches!(
            cursor_from_page(&rows, "id"),
            Err(SyncError::InvalidCursor(_))
        ));
    }

    #[test]
    fn test_page_serialization_omits_missing_state() {
        let page = ExportPage::terminal(vec![]);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json, json!({"data": [], "lastPage": true}));

        let page = ExportPage {
            data: vec![row(json!({"id": 1}))],
            last_page: false,
            state: Some(ExportState::new(1)),
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["state"], json!({"startIndex": 1}));
    }

    #[test]
    fn test_state_defaults_to_zero() {
        let state: ExportState = serde_json::from_value(json!({})).unwrap();
        assert_eq!(state.start_index, 0);
    }
}
