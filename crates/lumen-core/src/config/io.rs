//! YAML load/save for configuration types

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load a configuration from a YAML file
///
/// A missing file yields `T::default()`. An unreadable or unparsable file is
/// logged and also yields the default, so a broken config never prevents the
/// pipeline from starting.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("[CONFIG] {:?} not found, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("[CONFIG] Failed to read {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("[CONFIG] Loaded {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("[CONFIG] Failed to parse {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Save a configuration as YAML
///
/// The document is written next to the target and renamed into place, so a
/// reader never observes a half-written file. Parent directories are created.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;

    let staging = path.with_extension("yaml.tmp");
    std::fs::write(&staging, yaml)
        .with_context(|| format!("Failed to write {:?}", staging))?;
    std::fs::rename(&staging, path)
        .with_context(|| format!("Failed to move {:?} into place", staging))?;

    log::info!("[CONFIG] Saved {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PresenterConfig;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config: PresenterConfig = load_config(Path::new("/nonexistent/lumen/presenter.yaml"));
        assert_eq!(config, PresenterConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("presenter.yaml");

        let mut config = PresenterConfig::default();
        config.pool.buffer_count = 6;
        config.scheduler.late_threshold_ms = 120;

        save_config(&config, &path).unwrap();
        let loaded: PresenterConfig = load_config(&path);

        assert_eq!(loaded.pool.buffer_count, 6);
        assert_eq!(loaded.scheduler.late_threshold_ms, 120);
        assert!(!path.with_extension("yaml.tmp").exists());
    }

    #[test]
    fn test_garbage_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presenter.yaml");
        std::fs::write(&path, "pool: [this is not a map").unwrap();

        let config: PresenterConfig = load_config(&path);
        assert_eq!(config, PresenterConfig::default());
    }
}
