pub mod config;
pub mod models;
pub mod recalc;
pub mod score;
pub mod task;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use taskpilot_core::task::parse_timestamp;
use taskpilot_core::{Config, FsBundleLoader, ModelCache, PersonalizationService, TaskDb};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub(crate) fn open_db(config: &Config) -> Result<TaskDb, Box<dyn std::error::Error>> {
    Ok(TaskDb::open(&config.database_path()?)?)
}

pub(crate) fn personalization(
    config: &Config,
) -> Result<PersonalizationService, Box<dyn std::error::Error>> {
    let loader = FsBundleLoader::new(config.model_dir()?)
        .with_max_peak_windows(config.personalization.max_peak_windows);
    Ok(PersonalizationService::new(
        Arc::new(ModelCache::new(Arc::new(loader))),
        config.thresholds(),
    ))
}

/// `--now` override for reproducible runs; wall clock otherwise.
pub(crate) fn resolve_now(now: Option<&str>) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    match now {
        Some(value) => Ok(parse_timestamp(value)?),
        None => Ok(Utc::now()),
    }
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
