//! Looper configuration
//!
//! Stored as YAML at [`default_config_path`]. Every field has a default, so a
//! partial (or missing) file is fine.

mod io;
mod looper;
mod paths;

pub use io::{load_config, save_config};
pub use looper::{LooperConfig, MAX_LATENCY_COMPENSATION_SECONDS};
pub use paths::default_config_path;
