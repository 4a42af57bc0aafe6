//! Inspect what the personalization gate sees for a user.

use std::path::PathBuf;

use clap::Subcommand;
use serde::Serialize;
use taskpilot_core::personalization::BundleStatus;
use taskpilot_core::Config;

use super::{personalization, print_json, CmdResult};

#[derive(Subcommand)]
pub enum ModelsAction {
    /// Show which model artifacts loaded for a user
    Status {
        #[arg(long, default_value_t = 1)]
        user: i64,
    },
    /// Run a title through the gate and show every decision
    Explain {
        /// Task title
        title: String,
        #[arg(long, default_value_t = 1)]
        user: i64,
    },
}

#[derive(Serialize)]
struct StatusOutput {
    user_id: i64,
    model_dir: PathBuf,
    #[serde(flatten)]
    status: BundleStatus,
}

pub fn run(action: ModelsAction) -> CmdResult {
    let config = Config::load()?;
    let service = personalization(&config)?;

    match action {
        ModelsAction::Status { user } => {
            let gate = service.for_user(user);
            print_json(&StatusOutput {
                user_id: user,
                model_dir: config.model_dir()?,
                status: gate.bundle().status(),
            })?;
        }
        ModelsAction::Explain { title, user } => {
            print_json(&service.for_user(user).explain(&title))?;
        }
    }
    Ok(())
}
