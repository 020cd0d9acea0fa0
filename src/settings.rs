// ABOUTME: Engine settings loaded from an optional TOML file
// ABOUTME: Every field has a default so an empty or missing file is valid

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::config::DEFAULT_PAGE_SIZE;

/// Upper bound on concurrent record operations per import
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub mysql: MySqlSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub max_concurrency: usize,
    /// Page size for exports that do not request one
    pub default_page_size: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MySqlSettings {
    pub connect_timeout_secs: u64,
}

impl Default for MySqlSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl MySqlSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Settings {
    /// Load and validate settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid settings in {:?}", path))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(contents).context("Failed to parse settings TOML")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.max_concurrency == 0 {
            bail!("engine.max_concurrency must be at least 1");
        }
        if self.engine.default_page_size == 0 {
            bail!("engine.default_page_size must be at least 1");
        }
        if self.mysql.connect_timeout_secs == 0 {
            bail!("mysql.connect_timeout_secs must be at least 1");
        }
        Ok(())
    }
}
