// ABOUTME: Request payloads for export/import/ping and their validated, typed forms
// ABOUTME: Every optional field is checked here so downstream logic only sees complete variants

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::ConnectionDescriptor;
use crate::error::{Result, SyncError};
use crate::export::ExportState;
use crate::session::Record;
use crate::utils::{count_placeholders, validate_identifier};

/// Page size used when neither the request nor the settings supply one
pub const DEFAULT_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub connection: ConnectionDescriptor,
    #[serde(default)]
    pub configuration: ExportConfigurationRequest,
    #[serde(default)]
    pub state: ExportState,
}

/// Export configuration as received from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfigurationRequest {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(rename = "type", default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub query: Option<QueryOptions>,
    #[serde(default)]
    pub once: Option<OnceOptions>,
    #[serde(default)]
    pub delta: Option<DeltaOptions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnceOptions {
    #[serde(default)]
    pub boolean_field: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaOptions {
    #[serde(default)]
    pub date_field: Option<String>,
    #[serde(default)]
    pub last_execution_time: Option<Value>,
}

/// Row selection policy for one export call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportMode {
    /// Every row past the cursor
    All,
    /// Rows whose flag column is still 0; exported rows get the flag set to 1
    Once { boolean_field: String },
    /// Rows whose timestamp column is newer than the last execution time
    Delta {
        date_field: String,
        last_execution_time: Value,
    },
    /// Single-row sample, never resumable
    Test,
}

/// A complete, validated export configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfiguration {
    pub table: String,
    pub page_size: u64,
    pub mode: ExportMode,
}

impl ExportConfigurationRequest {
    /// Validate into a typed configuration.
    ///
    /// `default_page_size` applies when the request carries no `query.size`.
    pub fn validate(&self, default_page_size: u64) -> Result<ExportConfiguration> {
        let table = required_identifier(self.table.as_deref(), "configuration.table")?;

        let page_size = self
            .query
            .as_ref()
            .and_then(|q| q.size)
            .unwrap_or(default_page_size);
        if page_size == 0 {
            return Err(SyncError::validation(
                "configuration.query.size must be greater than zero",
            ));
        }

        let mode = match self.mode.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(SyncError::validation("configuration.type is required"));
            }
            Some("all") => ExportMode::All,
            Some("test") => ExportMode::Test,
            Some("once") => {
                let field = self.once.as_ref().and_then(|o| o.boolean_field.as_deref());
                ExportMode::Once {
                    boolean_field: required_identifier(field, "configuration.once.booleanField")?,
                }
            }
            Some("delta") => {
                let delta = self.delta.as_ref();
                let field = delta.and_then(|d| d.date_field.as_deref());
                let date_field = required_identifier(field, "configuration.delta.dateField")?;
                let last_execution_time = delta
                    .and_then(|d| d.last_execution_time.clone())
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| {
                        SyncError::validation(
                            "configuration.delta.lastExecutionTime is required for delta exports",
                        )
                    })?;
                ExportMode::Delta {
                    date_field,
                    last_execution_time,
                }
            }
            Some(other) => {
                return Err(SyncError::validation(format!(
                    "configuration.type '{}' is not one of all, once, delta, test",
                    other
                )));
            }
        };

        Ok(ExportConfiguration {
            table,
            page_size,
            mode,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub connection: ConnectionDescriptor,
    #[serde(default)]
    pub configuration: ImportConfigurationRequest,
    /// Records after field mapping; these are written
    #[serde(default)]
    pub post_map_data: Vec<Record>,
    /// Records before field mapping, index-aligned with `post_map_data`
    #[serde(default)]
    pub pre_map_data: Option<Vec<Record>>,
}

/// A boolean flag that callers send either as a JSON bool or as "true"/"false".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn parse(&self, field: &str) -> Result<bool> {
        match self {
            Flag::Bool(b) => Ok(*b),
            Flag::Text(s) if s == "true" => Ok(true),
            Flag::Text(s) if s == "false" => Ok(false),
            Flag::Text(s) => Err(SyncError::validation(format!(
                "{} must be \"true\" or \"false\", got \"{}\"",
                field, s
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingRecConditionRequest {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub col_field: Option<Vec<String>>,
}

/// Import configuration as received from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportConfigurationRequest {
    #[serde(default)]
    pub import_type: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub ignore_existing_records: Option<Flag>,
    #[serde(default)]
    pub ignore_missing_records: Option<Flag>,
    #[serde(default)]
    pub existing_rec_condition: Option<ExistingRecConditionRequest>,
}

/// A parameterized WHERE fragment plus the record columns that feed its placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRecCondition {
    pub condition: String,
    pub col_field: Vec<String>,
}

/// How incoming records are reconciled against the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStrategy {
    /// Blind insert of every record
    Add,
    /// Insert unless a row matching the condition already exists
    AddIgnoreExisting { condition: ExistingRecCondition },
    /// Update the row matching the condition
    Update {
        condition: ExistingRecCondition,
        ignore_missing: bool,
    },
    /// Update the row matching the condition, insert when there is none
    AddUpdate { condition: ExistingRecCondition },
}

impl ImportStrategy {
    pub fn condition(&self) -> Option<&ExistingRecCondition> {
        match self {
            ImportStrategy::Add => None,
            ImportStrategy::AddIgnoreExisting { condition }
            | ImportStrategy::Update { condition, .. }
            | ImportStrategy::AddUpdate { condition } => Some(condition),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImportStrategy::Add | ImportStrategy::AddIgnoreExisting { .. } => "add",
            ImportStrategy::Update { .. } => "update",
            ImportStrategy::AddUpdate { .. } => "addUpdate",
        }
    }
}

/// A complete, validated import configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfiguration {
    pub table: String,
    pub strategy: ImportStrategy,
}

/// Import type as named by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportType {
    Add,
    Update,
    AddUpdate,
}

impl ImportConfigurationRequest {
    /// Validate into a typed configuration.
    ///
    /// Checks run in a fixed order so callers always get the first problem:
    /// import type, table, non-empty batch, then the type-specific fields.
    pub fn validate(&self, batch_len: usize) -> Result<ImportConfiguration> {
        let import_type = match self.import_type.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(SyncError::validation(
                    "configuration.importType is required",
                ));
            }
            Some("add") => ImportType::Add,
            Some("update") => ImportType::Update,
            Some("addUpdate") => ImportType::AddUpdate,
            Some(other) => {
                return Err(SyncError::validation(format!(
                    "configuration.importType '{}' is not one of add, update, addUpdate",
                    other
                )));
            }
        };

        let table = required_identifier(self.table.as_deref(), "configuration.table")?;

        if batch_len == 0 {
            return Err(SyncError::validation(
                "postMapData must contain at least one record",
            ));
        }

        let strategy = match import_type {
            ImportType::Add => {
                let ignore_existing = self
                    .ignore_existing_records
                    .as_ref()
                    .map(|f| f.parse("configuration.ignoreExistingRecords"))
                    .transpose()?
                    .unwrap_or(false);
                if ignore_existing {
                    ImportStrategy::AddIgnoreExisting {
                        condition: self.condition()?,
                    }
                } else {
                    ImportStrategy::Add
                }
            }
            ImportType::Update => {
                let condition = self.condition()?;
                let ignore_missing = self
                    .ignore_missing_records
                    .as_ref()
                    .ok_or_else(|| {
                        SyncError::validation(
                            "configuration.ignoreMissingRecords is required for update imports",
                        )
                    })?
                    .parse("configuration.ignoreMissingRecords")?;
                ImportStrategy::Update {
                    condition,
                    ignore_missing,
                }
            }
            ImportType::AddUpdate => ImportStrategy::AddUpdate {
                condition: self.condition()?,
            },
        };

        Ok(ImportConfiguration { table, strategy })
    }

    fn condition(&self) -> Result<ExistingRecCondition> {
        let request = self.existing_rec_condition.as_ref().ok_or_else(|| {
            SyncError::validation("configuration.existingRecCondition is required")
        })?;

        let condition = request
            .condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                SyncError::validation("configuration.existingRecCondition.condition is required")
            })?
            .to_string();

        let col_field = request.col_field.clone().unwrap_or_default();
        for column in &col_field {
            validate_identifier(column)?;
        }

        let placeholders = count_placeholders(&condition);
        if placeholders != col_field.len() {
            return Err(SyncError::validation(format!(
                "configuration.existingRecCondition has {} placeholders but colField names {} columns",
                placeholders,
                col_field.len()
            )));
        }

        Ok(ExistingRecCondition {
            condition,
            col_field,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingRequest {
    pub connection: ConnectionDescriptor,
}

fn required_identifier(value: Option<&str>, field: &str) -> Result<String> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SyncError::validation(format!("{} is required", field)))?;
    validate_identifier(value)?;
    Ok(value.to_string())
}
