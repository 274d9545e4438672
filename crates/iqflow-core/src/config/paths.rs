//! Standard locations for iqflow files

use std::path::PathBuf;

/// Directory holding iqflow config files
///
/// `$XDG_CONFIG_HOME/iqflow` (or the platform equivalent), falling back to
/// `./iqflow` when the platform reports no config directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("iqflow")
}

/// Path of a named config file inside [`default_config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}
