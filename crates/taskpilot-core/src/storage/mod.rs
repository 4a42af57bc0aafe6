mod config;
pub mod task_db;

pub use config::{Config, PersonalizationConfig, RecalculationConfig, StorageConfig, SuggestionsConfig};
pub use task_db::{TaskDb, TaskFilter};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/taskpilot[-dev]/` based on TASKPILOT_ENV.
///
/// Set TASKPILOT_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TASKPILOT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("taskpilot-dev")
    } else {
        base_dir.join("taskpilot")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
