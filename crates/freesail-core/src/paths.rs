//! Path resolution utilities.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the Freesail base directory (~/.freesail).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".freesail"))
}

/// Get the main config file path (~/.freesail/freesail.json5).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("freesail.json5"))
}

/// Get the directory scanned for catalog files at gateway start-up.
pub fn catalogs_dir() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("catalogs"))
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
