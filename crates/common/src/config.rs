use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors from loading a [`CoreConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level runtime configuration, read from a JSON file.
///
/// Every section is optional; missing sections take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub file_system: FileSystemConfig,
    pub logging: LoggingConfig,
    pub snapshot: SnapshotConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemConfig {
    /// Base directory for snapshot stores.
    pub root_path: PathBuf,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `ember_kernel=debug`.
    pub filter: String,
    pub output: LogOutput,
    /// Log file used when `output` is `file`.
    pub file_name: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            output: LogOutput::Stdout,
            file_name: PathBuf::from("ember.log"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// zstd level used by the file-backed snapshot store.
    pub compression_level: i32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            compression_level: 3,
        }
    }
}

impl CoreConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}
