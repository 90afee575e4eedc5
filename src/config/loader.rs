//! Configuration loading.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::schema::ForemanConfig;

/// Default configuration path: `~/.foreman/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".foreman").join("config.toml"))
}

/// Load configuration from an explicit path. A missing file is an error
/// here; use [`load_default_config`] for the missing-is-default behaviour.
pub fn load_config(path: &Path) -> Result<ForemanConfig> {
    let raw = std::fs::read_to_string(path)?;
    toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

/// Load `~/.foreman/config.toml`, falling back to defaults when the file
/// (or the home directory) does not exist.
pub fn load_default_config() -> Result<ForemanConfig> {
    match default_config_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => Ok(ForemanConfig::default()),
    }
}
