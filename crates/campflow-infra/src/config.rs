//! Engine configuration loader for Campflow.
//!
//! Reads `config.toml` from the data directory (`~/.campflow/` in production)
//! and deserializes it into [`EngineConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use campflow_core::campaign::routes::RouteTable;
use campflow_types::config::EngineConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CAMPFLOW_DATA_DIR";

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`EngineConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
/// - A `[routes]` table that fails validation is dropped with a warning, so
///   the built-in routes apply.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %config_path.display(), "no config.toml found, using defaults");
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!(path = %config_path.display(), %err, "failed to read config, using defaults");
            return EngineConfig::default();
        }
    };

    let mut config = match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %config_path.display(), %err, "failed to parse config, using defaults");
            return EngineConfig::default();
        }
    };

    if let Err(err) = RouteTable::from_config(config.routes.as_ref()) {
        tracing::warn!(%err, "invalid [routes] table, using built-in routes");
        config.routes = None;
    }
    config
}

/// Resolve the data directory.
///
/// Priority:
/// 1. `CAMPFLOW_DATA_DIR` environment variable
/// 2. `~/.campflow`
/// 3. `.campflow` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".campflow");
    }

    PathBuf::from(".campflow")
}
