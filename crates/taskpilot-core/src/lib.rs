//! # Taskpilot Core Library
//!
//! Priority scoring and personalization for a personal task manager. The
//! CLI binary is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Scoring**: a pure function from due date, importance and boosts to a
//!   clamped 0-100 score with a per-component breakdown
//! - **Personalization**: per-user text models whose output is trusted only
//!   after relevance and confidence gates
//! - **Suggestions**: at most one "schedule" or "split" hint per task,
//!   never scheduling past the deadline
//! - **Recalculation**: periodic rescoring as deadlines approach
//! - **Storage**: SQLite task storage and TOML configuration
//!
//! ## Key Components
//!
//! - [`calculate_priority_score`]: the scoring engine
//! - [`PersonalizationGate`]: gated per-user model output
//! - [`SuggestionPolicy`]: schedule/split decision
//! - [`Prioritizer`]: create/edit pipeline
//! - [`RecalculationJob`]: batch rescoring over a [`TaskStore`]

pub mod error;
pub mod personalization;
pub mod pipeline;
pub mod recalc;
pub mod scoring;
pub mod storage;
pub mod suggestion;
pub mod task;

pub use error::{ConfigError, CoreError, DatabaseError, ModelError, Result, ValidationError};
pub use personalization::{
    BundleLoader, FsBundleLoader, GateOutcome, GateReport, GateThresholds, ModelBundle,
    ModelCache, ModelKind, PersonalizationGate, PersonalizationResult, PersonalizationService,
    ProductivityProfile,
};
pub use pipeline::{Prioritizer, TaskAssessment};
pub use recalc::{RecalcReport, RecalculationJob, TaskStore};
pub use scoring::{calculate_priority_score, PriorityScore, ScoreBreakdown, ScoreRequest};
pub use storage::{Config, TaskDb, TaskFilter};
pub use suggestion::{SmartSuggestion, SuggestionKind, SuggestionPolicy};
pub use task::{TaskDraft, TaskEdit, TaskId, TaskMetadata, TaskRecord};
