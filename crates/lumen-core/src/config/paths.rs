//! Standard locations for lumen configuration files

use std::path::PathBuf;

/// Directory holding lumen configuration
///
/// Returns: `<platform config dir>/lumen` (e.g. `~/.config/lumen` on Linux)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lumen")
}

/// Path of a named config file inside [`default_config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}
