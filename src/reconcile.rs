// ABOUTME: RecordReconciler - per-record insert, select-or-insert and update-or-insert
// ABOUTME: Fans records out over one session and keeps outcomes index-aligned with the input

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use tracing::{debug, info, warn};

use crate::config::{ExistingRecCondition, ImportStrategy};
use crate::error::{DbError, Result, SyncError};
use crate::session::{Dialect, Record, Session};

/// Status code of a successful record
pub const STATUS_OK: i64 = 200;

/// Status code of a record that matched no row and was deliberately skipped
pub const STATUS_MISSING_IGNORED: i64 = 1032;

/// Id reported for a record that was not written
pub const FAILED_ID: i64 = -1;

/// Per-record result of an import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub status_code: i64,
    pub id: Value,
}

impl RecordOutcome {
    pub fn success(id: Value) -> Self {
        Self {
            status_code: STATUS_OK,
            id,
        }
    }

    pub fn failure(err: &DbError) -> Self {
        Self {
            status_code: err.code,
            id: Value::from(FAILED_ID),
        }
    }

    pub fn missing_ignored() -> Self {
        Self {
            status_code: STATUS_MISSING_IGNORED,
            id: Value::from(FAILED_ID),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

/// A batch ready to be reconciled.
///
/// `columns` is the shared column set of `records`; `originals` holds the
/// pre-mapping records, index-aligned with `records`.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileBatch<'a> {
    pub table: &'a str,
    pub key_column: &'a str,
    pub columns: &'a [String],
    pub records: &'a [Record],
    pub originals: &'a [Record],
}

/// What happened to one record before missing-record policy is applied
enum Reconciled {
    Done(RecordOutcome),
    /// Update matched no row and the policy leaves it unresolved
    Missing,
}

/// What an update that matched no row turns into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnMissing {
    /// Outcome `{1032, -1}`
    Report,
    /// Left unresolved; fails the batch once every record has run
    Collect,
    /// Fall back to a single insert
    Insert,
}

/// Per-record step of a strategy
enum Step<'c> {
    Insert,
    SelectOrInsert {
        select: String,
        condition: &'c ExistingRecCondition,
    },
    Update {
        update: String,
        condition: &'c ExistingRecCondition,
        on_missing: OnMissing,
    },
}

/// Statements shared by every record of a batch
struct Plan<'c> {
    insert: String,
    step: Step<'c>,
}

impl<'c> Plan<'c> {
    fn build(dialect: Dialect, batch: &ReconcileBatch<'_>, strategy: &'c ImportStrategy) -> Self {
        let insert = build_insert(dialect, batch.table, batch.columns);
        let update = |condition: &ExistingRecCondition| {
            build_update(dialect, batch.table, batch.columns, condition)
        };

        let step = match strategy {
            ImportStrategy::Add => Step::Insert,
            ImportStrategy::AddIgnoreExisting { condition } => Step::SelectOrInsert {
                select: build_select(dialect, batch.table, condition),
                condition,
            },
            ImportStrategy::Update {
                condition,
                ignore_missing,
            } => Step::Update {
                update: update(condition),
                condition,
                on_missing: if *ignore_missing {
                    OnMissing::Report
                } else {
                    OnMissing::Collect
                },
            },
            ImportStrategy::AddUpdate { condition } => Step::Update {
                update: update(condition),
                condition,
                on_missing: OnMissing::Insert,
            },
        };

        Self { insert, step }
    }
}

/// Applies an import strategy record by record over one session.
///
/// Records run concurrently, at most `max_concurrency` at a time; the
/// session serializes them onto its connection. A record's database error is
/// captured into that record's outcome and never stops its siblings.
pub struct RecordReconciler<'a, S: Session + ?Sized> {
    session: &'a S,
    max_concurrency: usize,
}

impl<'a, S: Session + ?Sized> RecordReconciler<'a, S> {
    pub fn new(session: &'a S, max_concurrency: usize) -> Self {
        Self {
            session,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Reconcile every record of `batch` according to `strategy`.
    ///
    /// Returns one outcome per record, in input order. For `update` with
    /// missing records not ignored, any record that matched no row fails the
    /// whole call with [`SyncError::MissingRecords`] once all records have run.
    pub async fn reconcile(
        &self,
        strategy: &ImportStrategy,
        batch: &ReconcileBatch<'_>,
    ) -> Result<Vec<RecordOutcome>> {
        let plan = Plan::build(self.session.dialect(), batch, strategy);
        debug!("Insert statement: {}", plan.insert);

        let results = self
            .fan_out(batch.records.len(), |idx| self.reconcile_one(&plan, batch, idx))
            .await?;

        let missing: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, result)| matches!(result, Reconciled::Missing))
            .map(|(idx, _)| idx)
            .collect();

        if !missing.is_empty() {
            warn!(
                "{} of {} records matched no existing row in '{}'",
                missing.len(),
                results.len(),
                batch.table
            );
            return Err(SyncError::MissingRecords { indices: missing });
        }

        let outcomes: Vec<RecordOutcome> = results
            .into_iter()
            .filter_map(|result| match result {
                Reconciled::Done(outcome) => Some(outcome),
                Reconciled::Missing => None,
            })
            .collect();

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            "Reconciled {} records into '{}' ({}): {} succeeded, {} not written",
            outcomes.len(),
            batch.table,
            strategy.name(),
            succeeded,
            outcomes.len() - succeeded
        );

        Ok(outcomes)
    }

    /// Insert every row with per-row isolation.
    pub async fn insert(
        &self,
        table: &str,
        key_column: &str,
        columns: &[String],
        rows: &[Record],
    ) -> Result<Vec<RecordOutcome>> {
        let sql = build_insert(self.session.dialect(), table, columns);
        self.fan_out(rows.len(), |idx| {
            self.insert_one(&sql, key_column, columns, &rows[idx], idx)
        })
        .await
    }

    async fn reconcile_one(
        &self,
        plan: &Plan<'_>,
        batch: &ReconcileBatch<'_>,
        idx: usize,
    ) -> Reconciled {
        let insert = || {
            self.insert_one(
                &plan.insert,
                batch.key_column,
                batch.columns,
                &batch.records[idx],
                idx,
            )
        };

        match &plan.step {
            Step::Insert => Reconciled::Done(insert().await),
            Step::SelectOrInsert { select, condition } => Reconciled::Done(
                self.select_or_insert(select, &plan.insert, condition, batch, idx)
                    .await,
            ),
            Step::Update {
                update,
                condition,
                on_missing,
            } => match self.update_one(update, condition, batch, idx).await {
                Some(outcome) => Reconciled::Done(outcome),
                None => match on_missing {
                    OnMissing::Report => Reconciled::Done(RecordOutcome::missing_ignored()),
                    OnMissing::Collect => Reconciled::Missing,
                    OnMissing::Insert => Reconciled::Done(insert().await),
                },
            },
        }
    }

    async fn insert_one(
        &self,
        sql: &str,
        key_column: &str,
        columns: &[String],
        record: &Record,
        idx: usize,
    ) -> RecordOutcome {
        match self.session.execute(sql, values_for(record, columns)).await {
            Ok(outcome) => {
                let id = outcome
                    .last_insert_id
                    .map(Value::from)
                    .or_else(|| record.get(key_column).cloned())
                    .unwrap_or(Value::Null);
                RecordOutcome::success(id)
            }
            Err(err) => {
                warn!("Insert of record {} failed: {}", idx, err);
                RecordOutcome::failure(&err)
            }
        }
    }

    async fn select_or_insert(
        &self,
        select: &str,
        insert: &str,
        condition: &ExistingRecCondition,
        batch: &ReconcileBatch<'_>,
        idx: usize,
    ) -> RecordOutcome {
        let record = &batch.records[idx];
        let params = values_for(record, &condition.col_field);

        match self.session.query(select, params).await {
            Ok(rows) => match rows.first() {
                Some(existing) => RecordOutcome::success(
                    existing
                        .get(batch.key_column)
                        .cloned()
                        .unwrap_or(Value::Null),
                ),
                None => {
                    self.insert_one(insert, batch.key_column, batch.columns, record, idx)
                        .await
                }
            },
            Err(err) => {
                warn!("Existing-record lookup for record {} failed: {}", idx, err);
                RecordOutcome::failure(&err)
            }
        }
    }

    /// Run the update for one record. `None` means no row matched.
    async fn update_one(
        &self,
        update: &str,
        condition: &ExistingRecCondition,
        batch: &ReconcileBatch<'_>,
        idx: usize,
    ) -> Option<RecordOutcome> {
        let record = &batch.records[idx];
        let mut params = values_for(record, batch.columns);
        params.extend(values_for(record, &condition.col_field));

        match self.session.execute(update, params).await {
            Ok(outcome) if outcome.affected_rows == 0 => None,
            Ok(_) => {
                let id = batch
                    .originals
                    .get(idx)
                    .and_then(|original| original.get(batch.key_column))
                    .or_else(|| record.get(batch.key_column))
                    .cloned()
                    .unwrap_or(Value::Null);
                Some(RecordOutcome::success(id))
            }
            Err(err) => {
                warn!("Update of record {} failed: {}", idx, err);
                Some(RecordOutcome::failure(&err))
            }
        }
    }

    /// Run `task(idx)` for every index with bounded concurrency.
    ///
    /// Each completion is written into its own pre-allocated slot, so the
    /// order in which tasks finish never affects the output order.
    async fn fan_out<T, F, Fut>(&self, len: usize, task: F) -> Result<Vec<T>>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut slots: Vec<Option<T>> = (0..len).map(|_| None).collect();

        let mut completions = stream::iter(0..len)
            .map(|idx| {
                let pending = task(idx);
                async move { (idx, pending.await) }
            })
            .buffer_unordered(self.max_concurrency);

        while let Some((idx, result)) = completions.next().await {
            slots[idx] = Some(result);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.ok_or_else(|| SyncError::Internal(format!("record {} produced no outcome", idx)))
            })
            .collect()
    }
}

/// Values of `columns` taken from `record`, NULL where absent
fn values_for(record: &Record, columns: &[String]) -> Vec<Value> {
    columns
        .iter()
        .map(|column| record.get(column).cloned().unwrap_or(Value::Null))
        .collect()
}

fn build_insert(dialect: Dialect, table: &str, columns: &[String]) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| dialect.quote(c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote(table),
        quoted.join(", "),
        placeholders
    )
}

fn build_select(dialect: Dialect, table: &str, condition: &ExistingRecCondition) -> String {
    format!(
        "SELECT * FROM {} WHERE {}",
        dialect.quote(table),
        condition.condition
    )
}

fn build_update(
    dialect: Dialect,
    table: &str,
    columns: &[String],
    condition: &ExistingRecCondition,
) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .map(|c| format!("{} = ?", dialect.quote(c)))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {}",
        dialect.quote(table),
        assignments.join(", "),
        condition.condition
    )
}
