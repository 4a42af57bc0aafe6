//! Smart suggestions attached to scored tasks.
//!
//! At most one suggestion is produced per scoring pass. Scheduling a hard
//! task into a peak window wins over splitting a high-friction task, but
//! only when some peak window lands strictly before the due date.

mod peak_window;

pub use peak_window::{resolve, PeakWindow};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::personalization::ProductivityProfile;
use crate::task::TaskId;

const SPLIT_TEXT: &str =
    "This looks like a task you often avoid. Would you like to break it down into smaller sub-tasks?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Schedule,
    Split,
}

/// Suggestion payload as consumed by a UI.
///
/// `payload` is an RFC 3339 timestamp for [`SuggestionKind::Schedule`] and
/// the task id for [`SuggestionKind::Split`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartSuggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub text: String,
    pub payload: String,
}

impl SmartSuggestion {
    pub fn schedule(window: &str, at: DateTime<Utc>) -> Self {
        Self {
            kind: SuggestionKind::Schedule,
            text: format!(
                "This seems like a high-effort task. You do your best work around {window}. Would you like to schedule it?"
            ),
            payload: at.to_rfc3339(),
        }
    }

    pub fn split(task_id: TaskId) -> Self {
        Self {
            kind: SuggestionKind::Split,
            text: SPLIT_TEXT.to_string(),
            payload: task_id.to_string(),
        }
    }

    /// The proposed start time, for schedule suggestions.
    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        match self.kind {
            SuggestionKind::Schedule => DateTime::parse_from_rfc3339(&self.payload)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            SuggestionKind::Split => None,
        }
    }
}

/// Decides which suggestion, if any, a task gets.
#[derive(Debug, Clone, Copy)]
pub struct SuggestionPolicy<'a> {
    profile: &'a ProductivityProfile,
}

impl<'a> SuggestionPolicy<'a> {
    pub fn new(profile: &'a ProductivityProfile) -> Self {
        Self { profile }
    }

    pub fn suggest(
        &self,
        task_id: TaskId,
        is_high_friction: bool,
        is_hard: bool,
        task_due_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<SmartSuggestion> {
        if is_hard && !self.profile.is_empty() {
            if let Some(suggestion) = self.schedule(task_id, task_due_date, now) {
                return Some(suggestion);
            }
            info!(task_id, "hard task but no peak window lands before its deadline");
        }

        if is_high_friction {
            debug!(task_id, "suggesting split for high-friction task");
            return Some(SmartSuggestion::split(task_id));
        }

        None
    }

    /// First resolvable peak window, in rank order, that starts before the
    /// due date.
    fn schedule(
        &self,
        task_id: TaskId,
        task_due_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<SmartSuggestion> {
        for window in &self.profile.peak_windows {
            let Some(at) = resolve(window, now) else {
                debug!(task_id, %window, "skipping unresolvable peak window");
                continue;
            };
            if task_due_date.is_some_and(|due| at >= due) {
                debug!(task_id, %window, %at, "peak window is not before the deadline");
                continue;
            }
            debug!(task_id, %window, %at, "suggesting schedule");
            return Some(SmartSuggestion::schedule(window, at));
        }
        None
    }
}
