use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::persistence::STORAGE_KEY;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub log: LogConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Key the persisted app state is stored under.
    pub namespace: String,
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: STORAGE_KEY.to_string(),
            data_dir: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}
