//! Score ad-hoc inputs without touching storage.

use clap::Args;
use taskpilot_core::task::{normalize_importance, parse_timestamp};
use taskpilot_core::{calculate_priority_score, ScoreRequest};

use super::{print_json, resolve_now, CmdResult};

#[derive(Args)]
pub struct ScoreArgs {
    /// Due date (RFC 3339, "YYYY-MM-DD HH:MM" or "YYYY-MM-DD")
    #[arg(long)]
    due: Option<String>,
    /// Importance 1-5
    #[arg(long, default_value_t = 3)]
    importance: i32,
    /// Personal multiplier applied to the importance component
    #[arg(long, default_value_t = 1.0)]
    multiplier: f64,
    /// Difficulty boost in points
    #[arg(long, default_value_t = 0.0)]
    boost: f64,
    /// Number of tasks this one blocks
    #[arg(long, default_value_t = 0)]
    blocks: u32,
    /// Evaluate as of this instant instead of now
    #[arg(long)]
    now: Option<String>,
}

pub fn run(args: ScoreArgs) -> CmdResult {
    let now = resolve_now(args.now.as_deref())?;
    let due = args.due.as_deref().map(parse_timestamp).transpose()?;

    let request = ScoreRequest::new(due, normalize_importance(Some(args.importance)))
        .with_personal_multiplier(args.multiplier)
        .with_difficulty_boost(args.boost)
        .with_blocks_task_count(args.blocks);
    print_json(&calculate_priority_score(&request, now))
}
