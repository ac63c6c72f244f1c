//! Standard locations for looper files

use std::path::PathBuf;

/// Directory holding the looper's configuration
///
/// Returns `<config dir>/looper` (e.g. `~/.config/looper` on Linux), or
/// `./looper` when the platform has no config directory.
fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("looper")
}

/// Default config file path: `<config dir>/looper/config.yaml`
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.yaml")
}
