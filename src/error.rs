// ABOUTME: Error types for export/import operations
// ABOUTME: Separates batch-fatal failures from raw database errors captured per record

use std::fmt;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// A database error as reported by the driver.
///
/// `code` is the raw server code (MySQL errno, SQLite extended result code).
/// Driver-level failures that never reached the server carry
/// [`DbError::DRIVER_ERROR_CODE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    pub code: i64,
    pub message: String,
}

impl DbError {
    /// Code used when the driver failed without a server error code
    pub const DRIVER_ERROR_CODE: i64 = 500;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Driver-level failure without a server code
    pub fn driver(message: impl Into<String>) -> Self {
        Self::new(Self::DRIVER_ERROR_CODE, message)
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for DbError {}

/// Errors that abort a whole export or import.
///
/// Record-local database failures never surface here; they are folded into
/// the record's outcome instead.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Malformed or incomplete configuration, rejected before touching the database
    #[error("validation error: {0}")]
    Validation(String),

    /// Key column could not be resolved unambiguously
    #[error("schema error: {0}")]
    Schema(String),

    /// Session could not be established
    #[error("connection error: {0}")]
    Connection(DbError),

    /// The mark-as-processed step touched a different number of rows than were read
    #[error("inconsistent update: expected {expected} rows to be marked, {actual} were updated")]
    InconsistentUpdate { expected: u64, actual: u64 },

    /// Update mode found no row for these records and missing records are not ignored
    #[error("no existing record matched input records at indices {indices:?}")]
    MissingRecords { indices: Vec<usize> },

    /// The last row of a page does not carry a usable numeric key
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// A batch-level statement (page query, catalog lookup, marking) failed
    #[error("database error: {0}")]
    Database(DbError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Whether this error was raised before any database work began
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        Self::Database(err)
    }
}
