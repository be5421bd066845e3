// Engine configuration, loaded from a TOML file:
//
//     settle_window_ms = 500
//     database_path = "/var/lib/canvas/canvas.db"
//     event_capacity = 256

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_SETTLE_WINDOW_MS: u64 = 500;
const MIN_SETTLE_WINDOW_MS: u64 = 50;
const MAX_SETTLE_WINDOW_MS: u64 = 5_000;
const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Quiet period after the last keystroke before a local edit settles.
    pub settle_window_ms: u64,
    /// SQLite file; `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
    /// Buffered events per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_window_ms: DEFAULT_SETTLE_WINDOW_MS,
            database_path: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn with_settle_window_ms(mut self, ms: u64) -> Self {
        self.settle_window_ms = ms;
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// The settle window, clamped to [50ms, 5s].
    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(
            self.settle_window_ms
                .clamp(MIN_SETTLE_WINDOW_MS, MAX_SETTLE_WINDOW_MS),
        )
    }
}
