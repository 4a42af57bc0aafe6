//! TOML-based application configuration.
//!
//! Stores:
//! - Personalization gate thresholds and the model artifact directory
//! - The hard-task cutoff used by the suggestion policy
//! - The recalculation watch interval
//! - The task database location
//!
//! Configuration is stored at `~/.config/taskpilot/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::personalization::{
    GateThresholds, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_RELEVANCE_THRESHOLD, MAX_PEAK_WINDOWS,
};
use crate::pipeline::{Prioritizer, DEFAULT_HARD_TASK_BOOST_THRESHOLD};

/// Personalization gate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizationConfig {
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Directory holding `user_<id>_*.json` artifacts.
    /// Defaults to `<data_dir>/models`.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
    #[serde(default = "default_max_peak_windows")]
    pub max_peak_windows: usize,
}

/// Suggestion policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionsConfig {
    #[serde(default = "default_hard_task_boost_threshold")]
    pub hard_task_boost_threshold: f64,
}

/// Recalculation job configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalculationConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Defaults to `<data_dir>/taskpilot.db`.
    #[serde(default)]
    pub database: Option<PathBuf>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/taskpilot/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub personalization: PersonalizationConfig,
    #[serde(default)]
    pub suggestions: SuggestionsConfig,
    #[serde(default)]
    pub recalculation: RecalculationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

// Default functions
fn default_relevance_threshold() -> f64 {
    DEFAULT_RELEVANCE_THRESHOLD
}
fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}
fn default_max_peak_windows() -> usize {
    MAX_PEAK_WINDOWS
}
fn default_hard_task_boost_threshold() -> f64 {
    DEFAULT_HARD_TASK_BOOST_THRESHOLD
}
fn default_interval_minutes() -> u64 {
    60
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: default_relevance_threshold(),
            confidence_threshold: default_confidence_threshold(),
            model_dir: None,
            max_peak_windows: default_max_peak_windows(),
        }
    }
}

impl Default for SuggestionsConfig {
    fn default() -> Self {
        Self {
            hard_task_boost_threshold: default_hard_task_boost_threshold(),
        }
    }
}

impl Default for RecalculationConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(unknown());
                    }
                    // Optional paths: empty clears back to the default
                    serde_json::Value::Null | serde_json::Value::String(_) if value.is_empty() => {
                        serde_json::Value::Null
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Path of the config file in the data directory.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// [`load`](Self::load) against an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the result fails validation. `self` is unchanged on error.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and save.
    ///
    /// # Errors
    ///
    /// See [`apply`](Self::apply); also fails if the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Restore and save the defaults.
    pub fn reset() -> Result<Self, ConfigError> {
        let cfg = Self::default();
        cfg.save()?;
        Ok(cfg)
    }

    /// Reject values outside their meaningful range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.personalization;
        check_unit("personalization.relevance_threshold", p.relevance_threshold)?;
        check_unit("personalization.confidence_threshold", p.confidence_threshold)?;

        let hard = self.suggestions.hard_task_boost_threshold;
        if !hard.is_finite() || hard < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "suggestions.hard_task_boost_threshold".into(),
                message: format!("{hard} must be a non-negative number"),
            });
        }
        if self.recalculation.interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "recalculation.interval_minutes".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn thresholds(&self) -> GateThresholds {
        GateThresholds {
            relevance: self.personalization.relevance_threshold,
            confidence: self.personalization.confidence_threshold,
        }
    }

    pub fn prioritizer(&self) -> Prioritizer {
        Prioritizer::new(self.suggestions.hard_task_boost_threshold)
    }

    /// Configured model directory, or `<data_dir>/models`.
    pub fn model_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.personalization.model_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(data_dir()?.join("models")),
        }
    }

    /// Configured database path, or `<data_dir>/taskpilot.db`.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.database {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("taskpilot.db")),
        }
    }
}

fn check_unit(key: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{value} is outside [0, 1]"),
        })
    }
}
