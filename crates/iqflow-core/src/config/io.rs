//! YAML config files
//!
//! [`read_config`] reports every failure; [`load_config`] is the lenient form
//! used at startup, falling back to defaults so a bad file never prevents the
//! pipeline from running.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read and parse a YAML config file
pub fn read_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    serde_yaml::from_str(&contents).with_context(|| format!("Invalid config in {:?}", path))
}

/// Load a config file, falling back to `T::default()`
///
/// A missing file is normal (first run) and logged at info; a file that
/// cannot be read or parsed is logged as a warning.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("[Config] {:?} not found, using defaults", path);
        return T::default();
    }

    match read_config(path) {
        Ok(config) => {
            log::info!("[Config] Loaded {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("[Config] {:#}, using defaults", e);
            T::default()
        }
    }
}

/// Write a config file, creating parent directories
///
/// The YAML goes to a sibling temp file first and is renamed into place, so a
/// crash mid-write leaves the previous file intact.
pub fn save_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    let staging = path.with_extension("yaml.tmp");
    std::fs::write(&staging, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", staging))?;
    std::fs::rename(&staging, path)
        .with_context(|| format!("Failed to move config into place: {:?}", path))?;

    log::info!("[Config] Saved {:?}", path);
    Ok(())
}
