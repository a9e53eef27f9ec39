use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use fuji_core::config::Config;

pub const CONFIG_ENV: &str = "FUJI_CONFIG";
pub const DATA_DIR_ENV: &str = "FUJI_DATA_DIR";

pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("fuji").join("config.toml"))
}

/// Reads the config file. A missing file is not an error.
pub fn load(path: Option<&Path>) -> Result<Config, String> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    toml::from_str(&raw).map_err(|err| format!("failed to parse {}: {err}", path.display()))
}

pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(dir) = env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = &config.storage.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .map(|dir| dir.join("fuji"))
        .unwrap_or_else(|| PathBuf::from(".fuji"))
}
