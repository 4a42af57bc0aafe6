//! Periodic rescoring of open tasks.
//!
//! Urgency grows as a due date approaches, so stored scores go stale. The
//! job rescans every open, future-dated task and rewrites the score when
//! the total has moved. Personalization is not re-run; only time decay is
//! reflected. Each write is independent, so an interrupted run can simply
//! be repeated. A write only lands if the task still has the due date and
//! importance it was scored from; a task edited mid-run is skipped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::rescore_plain;
use crate::scoring::PriorityScore;
use crate::task::TaskRecord;

/// Storage operations the job needs.
pub trait TaskStore {
    /// Open tasks with a due date strictly after `now`.
    fn recalculation_candidates(&self, now: DateTime<Utc>) -> Result<Vec<TaskRecord>>;

    /// Persist a new total and breakdown for `task`.
    ///
    /// Returns `false` without writing when the stored task no longer
    /// matches `task` on the score inputs (completed, due date, importance).
    fn write_priority(&self, task: &TaskRecord, score: &PriorityScore) -> Result<bool>;
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalcReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub examined: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Edited or closed between read and write
    pub skipped: usize,
    pub failed: usize,
}

impl RecalcReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            examined: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            failed: 0,
        }
    }
}

pub struct RecalculationJob<'a, S: TaskStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: TaskStore + ?Sized> RecalculationJob<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Rescore every candidate relative to `now`.
    ///
    /// # Errors
    /// Fails only if the candidate list cannot be read. Individual write
    /// failures are logged and counted in the report.
    pub fn run(&self, now: DateTime<Utc>) -> Result<RecalcReport> {
        let mut report = RecalcReport::new(now);
        let tasks = self.store.recalculation_candidates(now)?;
        info!(run_id = %report.run_id, candidates = tasks.len(), "starting priority recalculation");

        for task in tasks.iter().filter(|t| t.needs_recalculation(now)) {
            report.examined += 1;
            let score = rescore_plain(task, now);
            if score.total_score == task.priority_score {
                report.unchanged += 1;
                continue;
            }

            match self.store.write_priority(task, &score) {
                Ok(false) => {
                    debug!(task_id = task.id, "task changed since read, skipping");
                    report.skipped += 1;
                }
                Ok(true) => {
                    debug!(
                        task_id = task.id,
                        old = task.priority_score,
                        new = score.total_score,
                        "priority updated"
                    );
                    report.updated += 1;
                }
                Err(e) => {
                    warn!(task_id = task.id, error = %e, "failed to write priority, continuing");
                    report.failed += 1;
                }
            }
        }

        info!(
            run_id = %report.run_id,
            examined = report.examined,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            failed = report.failed,
            "priority recalculation finished"
        );
        Ok(report)
    }
}
