pub mod doctor;
pub mod onboard;
pub mod parse;
pub mod run;
pub mod workflow;

use agentbus_config::AppConfig;
use std::path::{Path, PathBuf};

/// The config file in use: `--config` if given, else the default location.
pub fn config_file(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load config from `--config` or the default location, then apply
/// environment overrides.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = config_file(explicit);
    let mut config =
        AppConfig::load_from(&path).map_err(|e| format!("Failed to load config: {e}"))?;
    config
        .apply_env(|key| std::env::var(key).ok())
        .map_err(|e| format!("Invalid environment override: {e}"))?;
    Ok(config)
}
