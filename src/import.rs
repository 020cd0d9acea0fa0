// ABOUTME: Importer - validates an import batch and dispatches it to the reconciler
// ABOUTME: Owns the batch shape checks shared by every import strategy

use std::collections::BTreeSet;
use tracing::info;

use crate::config::{ImportConfiguration, ImportConfigurationRequest};
use crate::error::{Result, SyncError};
use crate::reconcile::{ReconcileBatch, RecordOutcome, RecordReconciler};
use crate::schema::{resolve_column_by_attribute, ColumnAttribute};
use crate::session::{Record, Session};
use crate::utils::validate_identifier;

/// A validated batch of records sharing one column set.
#[derive(Debug, Clone)]
pub struct ImportBatch {
    columns: Vec<String>,
    records: Vec<Record>,
    originals: Vec<Record>,
}

/// Validate an import request body into a configuration and a batch.
///
/// `pre_map_data` defaults to `post_map_data` when absent.
pub fn validate_import(
    request: &ImportConfigurationRequest,
    post_map_data: Vec<Record>,
    pre_map_data: Option<Vec<Record>>,
) -> Result<(ImportConfiguration, ImportBatch)> {
    let config = request.validate(post_map_data.len())?;

    let first = post_map_data
        .first()
        .ok_or_else(|| SyncError::validation("postMapData must contain at least one record"))?;
    let columns: Vec<String> = first.keys().cloned().collect();
    if columns.is_empty() {
        return Err(SyncError::validation(
            "postMapData records must contain at least one field",
        ));
    }
    for column in &columns {
        validate_identifier(column)?;
    }

    let expected: BTreeSet<&String> = columns.iter().collect();
    for (idx, record) in post_map_data.iter().enumerate().skip(1) {
        let keys: BTreeSet<&String> = record.keys().collect();
        if keys != expected {
            return Err(SyncError::validation(format!(
                "postMapData record {} does not have the same fields as record 0",
                idx
            )));
        }
    }

    if let Some(condition) = config.strategy.condition() {
        for column in &condition.col_field {
            if !expected.contains(column) {
                return Err(SyncError::validation(format!(
                    "existingRecCondition.colField '{}' is not a field of postMapData",
                    column
                )));
            }
        }
    }

    let originals = match pre_map_data {
        Some(originals) if originals.len() != post_map_data.len() => {
            return Err(SyncError::validation(format!(
                "preMapData has {} records but postMapData has {}",
                originals.len(),
                post_map_data.len()
            )));
        }
        Some(originals) => originals,
        None => post_map_data.clone(),
    };

    Ok((
        config,
        ImportBatch {
            columns,
            records: post_map_data,
            originals,
        },
    ))
}

/// Writes validated batches into a table through one session.
pub struct Importer<'a, S: Session + ?Sized> {
    session: &'a S,
    max_concurrency: usize,
}

impl<'a, S: Session + ?Sized> Importer<'a, S> {
    pub fn new(session: &'a S, max_concurrency: usize) -> Self {
        Self {
            session,
            max_concurrency,
        }
    }

    /// Import `batch` and return one outcome per record, in input order.
    pub async fn import(
        &self,
        config: &ImportConfiguration,
        batch: &ImportBatch,
    ) -> Result<Vec<RecordOutcome>> {
        let key_column = resolve_column_by_attribute(
            self.session,
            &config.table,
            ColumnAttribute::AutoIncrement,
        )
        .await?;

        if !batch.columns.iter().any(|c| c == &key_column) {
            return Err(SyncError::validation(format!(
                "key field missing in mapping: '{}' of table '{}' is not a field of postMapData",
                key_column, config.table
            )));
        }

        info!(
            "Importing {} records into '{}' ({})",
            batch.records.len(),
            config.table,
            config.strategy.name()
        );

        RecordReconciler::new(self.session, self.max_concurrency)
            .reconcile(
                &config.strategy,
                &ReconcileBatch {
                    table: &config.table,
                    key_column: &key_column,
                    columns: &batch.columns,
                    records: &batch.records,
                    originals: &batch.originals,
                },
            )
            .await
    }
}
