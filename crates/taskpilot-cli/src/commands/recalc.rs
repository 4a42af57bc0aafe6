//! Rescore open dated tasks, once or on an interval.

use std::time::Duration;

use clap::Args;
use taskpilot_core::{Config, RecalculationJob, TaskDb};
use tracing::{error, info};

use super::{open_db, print_json, resolve_now, CmdResult};

#[derive(Args)]
pub struct RecalcArgs {
    /// Keep running, one pass per interval
    #[arg(long)]
    watch: bool,
    /// Minutes between passes (default: recalculation.interval_minutes)
    #[arg(long, requires = "watch", value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,
    /// Evaluate as of this instant instead of now (single pass only)
    #[arg(long, conflicts_with = "watch")]
    now: Option<String>,
}

pub fn run(args: RecalcArgs) -> CmdResult {
    let config = Config::load()?;
    let db = open_db(&config)?;

    if !args.watch {
        let now = resolve_now(args.now.as_deref())?;
        let report = RecalculationJob::new(&db).run(now)?;
        return print_json(&report);
    }

    let minutes = args.interval.unwrap_or(config.recalculation.interval_minutes);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .enable_io()
        .build()?;
    runtime.block_on(watch(&db, Duration::from_secs(minutes * 60)));
    Ok(())
}

/// Run a pass per tick until Ctrl-C. A failed pass is logged and the loop
/// keeps going.
async fn watch(db: &TaskDb, period: Duration) {
    info!(period_secs = period.as_secs(), "recalculation loop started");
    let job = RecalculationJob::new(db);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match job.run(chrono::Utc::now()) {
                    Ok(report) => {
                        if let Err(e) = print_json(&report) {
                            error!(error = %e, "failed to print report");
                        }
                    }
                    Err(e) => error!(error = %e, "recalculation pass failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("recalculation loop stopped");
                break;
            }
        }
    }
}
