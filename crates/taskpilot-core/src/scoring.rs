//! Priority scoring engine.
//!
//! Produces a task priority in `[0, 100]` from four components, each kept in
//! the breakdown for explainability:
//!
//! | Component  | Cap | Source                                        |
//! |------------|-----|-----------------------------------------------|
//! | urgency    | 50  | step function over days until the due date    |
//! | importance | 30  | 5-point table × personal multiplier           |
//! | dependency | 20  | 10 points per blocked task                    |
//! | difficulty | –   | additive boost from the difficulty model      |
//!
//! The total is clamped to `[0, 100]`. Scoring is a pure function of its
//! inputs and the reference time; it has no error states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum urgency contribution.
pub const URGENCY_WEIGHT: f64 = 50.0;
/// Maximum importance contribution (at multiplier 1.0).
pub const IMPORTANCE_WEIGHT: f64 = 30.0;
/// Maximum dependency contribution.
pub const DEPENDENCY_WEIGHT: f64 = 20.0;
/// Points per task blocked by this one.
pub const POINTS_PER_BLOCKED_TASK: f64 = 10.0;

/// Importance assumed when the caller supplies none.
pub const DEFAULT_IMPORTANCE: i32 = 3;

/// `(max days until due, fraction of URGENCY_WEIGHT)`, first match wins.
const URGENCY_STEPS: [(f64, f64); 5] = [
    (0.0, 1.0),  // overdue or due now
    (1.0, 0.9),  // within 24 hours
    (3.0, 0.6),  // within 3 days
    (7.0, 0.3),  // this week
    (14.0, 0.1), // within 2 weeks
];

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Points for each step of the 1-5 importance scale.
///
/// Values outside the scale contribute nothing.
pub fn importance_points(importance: i32) -> f64 {
    match importance {
        1 => 0.0,
        2 => 7.5,
        3 => 15.0,
        4 => 22.5,
        5 => IMPORTANCE_WEIGHT,
        _ => 0.0,
    }
}

/// Per-component contributions, each rounded to one decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoreBreakdown {
    pub urgency_score: f64,
    pub importance_score: f64,
    pub difficulty_boost: f64,
    pub dependency_score: f64,
}

/// Result of a scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityScore {
    /// Clamped total, rounded to one decimal
    pub total_score: f64,
    pub breakdown: ScoreBreakdown,
}

impl PriorityScore {
    /// Component with the largest contribution, by breakdown field name.
    pub fn dominant_component(&self) -> &'static str {
        let b = &self.breakdown;
        [
            ("urgency_score", b.urgency_score),
            ("importance_score", b.importance_score),
            ("difficulty_boost", b.difficulty_boost),
            ("dependency_score", b.dependency_score),
        ]
        .into_iter()
        .fold(("urgency_score", f64::MIN), |best, cur| {
            if cur.1 > best.1 {
                cur
            } else {
                best
            }
        })
        .0
    }
}

/// Inputs to [`calculate_priority_score`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRequest {
    pub due_date: Option<DateTime<Utc>>,
    /// User importance, 1-5
    pub importance: i32,
    /// Scales the importance component; not clamped
    pub personal_multiplier: f64,
    /// Added to the total as-is
    pub difficulty_boost: f64,
    /// Number of tasks this one blocks
    pub blocks_task_count: u32,
}

impl ScoreRequest {
    /// Request with no personalization inputs.
    pub fn new(due_date: Option<DateTime<Utc>>, importance: i32) -> Self {
        Self {
            due_date,
            importance,
            personal_multiplier: 1.0,
            difficulty_boost: 0.0,
            blocks_task_count: 0,
        }
    }

    pub fn with_personal_multiplier(mut self, multiplier: f64) -> Self {
        self.personal_multiplier = multiplier;
        self
    }

    pub fn with_difficulty_boost(mut self, boost: f64) -> Self {
        self.difficulty_boost = boost;
        self
    }

    pub fn with_blocks_task_count(mut self, count: u32) -> Self {
        self.blocks_task_count = count;
        self
    }
}

/// Score a task relative to `now`.
pub fn calculate_priority_score(request: &ScoreRequest, now: DateTime<Utc>) -> PriorityScore {
    let urgency = urgency_score(request.due_date, now);
    let importance = importance_points(request.importance) * request.personal_multiplier;
    let dependency = dependency_score(request.blocks_task_count);
    let boost = request.difficulty_boost;

    let raw = urgency + importance + dependency + boost;
    let total = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 100.0) };

    PriorityScore {
        total_score: round1(total),
        breakdown: ScoreBreakdown {
            urgency_score: round1(urgency),
            importance_score: round1(importance),
            difficulty_boost: round1(boost),
            dependency_score: round1(dependency),
        },
    }
}

/// Urgency contribution for a due date.
pub fn urgency_score(due_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(due) = due_date else {
        return 0.0;
    };

    let days_until_due = due.signed_duration_since(now).num_milliseconds() as f64
        / 1000.0
        / SECONDS_PER_DAY;

    URGENCY_STEPS
        .iter()
        .find(|(max_days, _)| days_until_due <= *max_days)
        .map(|(_, fraction)| URGENCY_WEIGHT * fraction)
        .unwrap_or(0.0)
}

/// Dependency contribution for the number of blocked tasks.
pub fn dependency_score(blocks_task_count: u32) -> f64 {
    if blocks_task_count == 0 {
        return 0.0;
    }
    (blocks_task_count as f64 * POINTS_PER_BLOCKED_TASK).min(DEPENDENCY_WEIGHT)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
