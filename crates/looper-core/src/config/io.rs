//! YAML config files
//!
//! Works with any serde type; [`LooperConfig`](super::LooperConfig) is the
//! one the looper uses.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Read and parse a YAML config file
///
/// `Ok(None)` when the file does not exist; read and parse failures are
/// errors carrying the path.
pub fn read_config<T>(path: &Path) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };
    let config = serde_yaml::from_str(&contents)
        .with_context(|| format!("Invalid config in {:?}", path))?;
    Ok(Some(config))
}

/// Load configuration, falling back to defaults
///
/// A missing file is normal on first start. An unreadable or invalid one is
/// logged, and the defaults are used as well.
///
/// ```ignore
/// let config: LooperConfig = load_config(&default_config_path());
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match read_config(path) {
        Ok(Some(config)) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Ok(None) => {
            log::info!("No config at {:?}, using defaults", path);
            T::default()
        }
        Err(e) => {
            log::warn!("{:#}; using defaults", e);
            T::default()
        }
    }
}

/// Save configuration as YAML, creating parent directories
///
/// Writes a sibling temp file first and renames it over `path`, so a crash
/// mid-write leaves the previous file intact.
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
        .with_context(|| format!("Failed to replace {:?}", path))?;

    log::info!("Saved config to {:?}", path);
    Ok(())
}
