// ABOUTME: Library root for rowsync - paged table export and reconciling import
// ABOUTME: Exposes the engine, its request types and the MySQL/SQLite sessions

pub mod config;
pub mod connection;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod export;
pub mod import;
pub mod mysql;
pub mod reconcile;
pub mod schema;
pub mod session;
pub mod settings;
pub mod sqlite;
pub mod utils;

pub use config::{ExportRequest, ImportRequest, PingRequest};
pub use connection::{ConnectionDescriptor, ConnectionProvider};
pub use engine::{PingResponse, SyncEngine};
pub use error::{DbError, SyncError};
pub use export::{ExportPage, ExportState, Exporter};
pub use import::{ImportBatch, Importer};
pub use reconcile::{RecordOutcome, RecordReconciler};
pub use session::{Dialect, Record, Session};
pub use settings::Settings;
