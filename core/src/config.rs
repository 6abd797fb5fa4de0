//! Engine configuration loaded from `stratum.toml`.
//!
//! Every section is optional; missing sections and fields fall back to the
//! defaults below.
//!
//! ```toml
//! [history]
//! max_depth = 20
//!
//! [canvas]
//! width = 1024
//! height = 1024
//! background_color = "#ffffff"
//!
//! [autosave]
//! enabled = true
//! debounce_ms = 1000
//! key = "canvas-snapshot"
//!
//! [storage]
//! root = "./.stratum"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::DEFAULT_DIAGNOSTICS_CAPACITY;
use crate::history::DEFAULT_MAX_HISTORY;

/// Errors raised while loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Canvas size and background, persisted with every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    #[serde(alias = "background_color")]
    pub background_color: String,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            background_color: "#ffffff".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of undoable operations kept.
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_HISTORY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub capacity: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    pub enabled: bool,
    /// Quiet period after the last edit before a snapshot is written.
    pub debounce_ms: u64,
    /// Storage key the snapshot is written under.
    pub key: String,
}

impl AutosaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 1000,
            key: "canvas-snapshot".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory used by the filesystem snapshot store.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./.stratum"),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history: HistoryConfig,
    pub diagnostics: DiagnosticsConfig,
    pub canvas: CanvasConfig,
    pub autosave: AutosaveConfig,
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Loads a configuration file.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    EngineConfig::from_toml(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads a configuration file, falling back to defaults if it is missing or invalid.
pub fn load_or_default(path: &Path) -> EngineConfig {
    match load_config(path) {
        Ok(config) => {
            log::info!(
                "Loaded config {} (history depth {}, canvas {}x{})",
                path.display(),
                config.history.max_depth,
                config.canvas.width,
                config.canvas.height
            );
            config
        }
        Err(e) => {
            log::warn!("No usable config ({e}), using defaults");
            EngineConfig::default()
        }
    }
}
