// ABOUTME: CursorFile - persists an export cursor between runs as JSON
// ABOUTME: Lets the CLI resume a paged export without the caller storing state

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::export::ExportState;

/// Saved position of a paged export over one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorFile {
    pub table: String,
    pub state: ExportState,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Format version
    pub version: u32,
}

impl CursorFile {
    pub fn new(table: &str, state: ExportState) -> Self {
        Self {
            table: table.to_string(),
            state,
            updated_at: chrono::Utc::now(),
            version: 1,
        }
    }

    /// Load a cursor file, or `None` when it does not exist yet
    pub async fn load_if_exists(path: &Path) -> Result<Option<Self>> {
        if !fs::try_exists(path)
            .await
            .with_context(|| format!("Failed to check cursor file {:?}", path))?
        {
            return Ok(None);
        }
        Self::load(path).await.map(Some)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read cursor from {:?}", path))?;
        let cursor: CursorFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cursor from {:?}", path))?;
        Ok(cursor)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize cursor")?;
        fs::write(path, contents)
            .await
            .with_context(|| format!("Failed to write cursor to {:?}", path))?;
        Ok(())
    }

    /// State to resume from, ignoring cursors saved for another table
    pub fn state_for(&self, table: &str) -> Option<ExportState> {
        (self.table == table).then_some(self.state)
    }
}
