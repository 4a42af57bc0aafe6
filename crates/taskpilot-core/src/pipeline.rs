//! Task creation and edit pipeline.
//!
//! Title → personalization → scoring → suggestion. Failures in
//! personalization or suggestion degrade to "none" and never block a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::personalization::{PersonalizationGate, PersonalizationResult};
use crate::scoring::{calculate_priority_score, PriorityScore, ScoreRequest};
use crate::suggestion::SmartSuggestion;
use crate::task::{normalize_importance, TaskDraft, TaskEdit, TaskId, TaskMetadata, TaskRecord};

/// Difficulty boost above which a task counts as hard.
pub const DEFAULT_HARD_TASK_BOOST_THRESHOLD: f64 = 10.0;

/// Everything computed for a new task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssessment {
    pub task_id: TaskId,
    /// Importance after any personalization override
    pub importance: i32,
    pub personalization: PersonalizationResult,
    pub score: PriorityScore,
    pub is_hard: bool,
    pub suggestion: Option<SmartSuggestion>,
    /// Metadata to persist with the task
    pub metadata: TaskMetadata,
}

/// Runs new and edited tasks through scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prioritizer {
    hard_task_boost_threshold: f64,
}

impl Default for Prioritizer {
    fn default() -> Self {
        Self::new(DEFAULT_HARD_TASK_BOOST_THRESHOLD)
    }
}

impl Prioritizer {
    pub fn new(hard_task_boost_threshold: f64) -> Self {
        Self {
            hard_task_boost_threshold,
        }
    }

    pub fn hard_task_boost_threshold(&self) -> f64 {
        self.hard_task_boost_threshold
    }

    /// Score a new task for the gate's user.
    ///
    /// # Errors
    /// Returns a validation error if the draft has no title.
    pub fn assess(
        &self,
        gate: &PersonalizationGate,
        draft: &TaskDraft,
        task_id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<TaskAssessment> {
        draft.validate()?;

        let requested = normalize_importance(Some(draft.importance));
        let personalization = gate.get_personalization(&draft.title);
        let importance = personalization.new_importance.unwrap_or(requested);
        if importance != requested {
            debug!(
                task_id,
                from = requested,
                to = importance,
                "importance overridden by personalization"
            );
        }

        let request = ScoreRequest::new(draft.due_date, importance)
            .with_difficulty_boost(personalization.difficulty_boost);
        let score = calculate_priority_score(&request, now);

        let is_hard = personalization.difficulty_boost > self.hard_task_boost_threshold;
        let suggestion = gate.get_smart_suggestion(
            task_id,
            personalization.is_high_friction,
            is_hard,
            draft.due_date,
            now,
        );

        info!(
            task_id,
            user_id = gate.user_id(),
            total = score.total_score,
            is_hard,
            suggestion = ?suggestion.as_ref().map(|s| s.kind),
            "assessed task"
        );

        let metadata = TaskMetadata {
            priority_breakdown: Some(score.breakdown),
            smart_suggestion: suggestion.clone(),
            tags: draft.tags.clone(),
            ..Default::default()
        };

        Ok(TaskAssessment {
            task_id,
            importance,
            personalization,
            score,
            is_hard,
            suggestion,
            metadata,
        })
    }

    /// Apply an edit and rescore if a score input changed.
    ///
    /// Rescoring uses only the due date and importance; the previous
    /// suggestion is dropped since it was computed for the old inputs.
    /// Returns whether the task was rescored.
    ///
    /// # Errors
    /// Returns a validation error if the edit blanks the title.
    pub fn reassess_after_edit(
        &self,
        record: &mut TaskRecord,
        edit: &TaskEdit,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let rescore = edit.affects_priority(record);
        edit.apply_to(record)?;
        record.updated_at = now;

        if !rescore {
            return Ok(false);
        }

        let score = rescore_plain(record, now);
        record.priority_score = score.total_score;
        record.metadata.priority_breakdown = Some(score.breakdown);
        if record.metadata.smart_suggestion.take().is_some() {
            debug!(task_id = record.id, "dropped stale suggestion after edit");
        }
        Ok(true)
    }
}

/// Score a stored task from its due date and importance alone.
pub fn rescore_plain(record: &TaskRecord, now: DateTime<Utc>) -> PriorityScore {
    calculate_priority_score(&ScoreRequest::new(record.due_date, record.importance), now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personalization::model::fixtures;
    use crate::personalization::{GateThresholds, ModelBundle, ProductivityProfile};
    use crate::suggestion::SuggestionKind;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    // Wednesday noon.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 11, 12, 0, 0).unwrap()
    }

    fn gate(bundle: ModelBundle) -> PersonalizationGate {
        PersonalizationGate::new(1, Arc::new(bundle), GateThresholds::default())
    }

    fn stored(assessment: &TaskAssessment, draft: &TaskDraft) -> TaskRecord {
        TaskRecord {
            id: assessment.task_id,
            user_id: 1,
            title: draft.title.clone(),
            description: None,
            due_date: draft.due_date,
            importance: assessment.importance,
            priority_score: assessment.score.total_score,
            completed: false,
            metadata: assessment.metadata.clone(),
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn unpersonalized_task_scores_from_draft() {
        let draft = TaskDraft::new("pay rent")
            .with_due_date(now() + Duration::hours(12))
            .with_importance(5);
        let a = Prioritizer::default()
            .assess(&gate(ModelBundle::empty()), &draft, 1, now())
            .unwrap();
        assert_eq!(a.score.total_score, 75.0);
        assert_eq!(a.importance, 5);
        assert!(!a.is_hard);
        assert_eq!(a.suggestion, None);
        assert_eq!(a.metadata.priority_breakdown, Some(a.score.breakdown));
    }

    #[test]
    fn out_of_scale_importance_scores_as_default() {
        let mut draft = TaskDraft::new("pay rent");
        draft.importance = 9;
        let a = Prioritizer::default()
            .assess(&gate(ModelBundle::empty()), &draft, 1, now())
            .unwrap();
        assert_eq!(a.importance, 3);
        assert_eq!(a.score.breakdown.importance_score, 15.0);

        let parsed: TaskDraft =
            serde_json::from_str(r#"{"title": "pay rent", "importance": 9}"#).unwrap();
        let b = Prioritizer::default()
            .assess(&gate(ModelBundle::empty()), &parsed, 2, now())
            .unwrap();
        assert_eq!(b.importance, 3);
        assert_eq!(b.score.total_score, 15.0);
    }

    #[test]
    fn blank_title_is_rejected() {
        let err = Prioritizer::default()
            .assess(&gate(ModelBundle::empty()), &TaskDraft::new(""), 1, now())
            .unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn hard_task_gets_scheduled_before_deadline() {
        let bundle = ModelBundle::empty()
            .with_difficulty(Arc::new(fixtures::regressor(&["thesis", "draft"], 120.0)))
            .with_profile(ProductivityProfile::new(vec!["Thursday 9:00".into()]));
        let draft = TaskDraft::new("thesis draft").with_due_date(now() + Duration::days(3));

        let a = Prioritizer::default().assess(&gate(bundle), &draft, 8, now()).unwrap();
        assert_eq!(a.personalization.difficulty_boost, 20.0);
        assert!(a.is_hard);
        // 60% urgency + default importance + boost
        assert_eq!(a.score.total_score, 30.0 + 15.0 + 20.0);
        let suggestion = a.suggestion.unwrap();
        assert_eq!(suggestion.kind, SuggestionKind::Schedule);
        assert_eq!(
            suggestion.scheduled_at(),
            Some(Utc.with_ymd_and_hms(2026, 3, 12, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn boost_at_threshold_is_not_hard() {
        let bundle = ModelBundle::empty()
            .with_difficulty(Arc::new(fixtures::regressor(&["slides"], 60.0)))
            .with_profile(ProductivityProfile::new(vec!["Thursday 9:00".into()]));
        let a = Prioritizer::default()
            .assess(&gate(bundle), &TaskDraft::new("slides"), 2, now())
            .unwrap();
        assert_eq!(a.personalization.difficulty_boost, 10.0);
        assert!(!a.is_hard);
        assert_eq!(a.suggestion, None);
    }

    #[test]
    fn custom_hard_threshold() {
        let bundle = ModelBundle::empty()
            .with_difficulty(Arc::new(fixtures::regressor(&["slides"], 60.0)))
            .with_profile(ProductivityProfile::new(vec!["Thursday 9:00".into()]));
        let a = Prioritizer::new(5.0)
            .assess(&gate(bundle), &TaskDraft::new("slides"), 2, now())
            .unwrap();
        assert!(a.is_hard);
        assert!(a.suggestion.is_some());
    }

    #[test]
    fn tags_flow_into_metadata() {
        let draft = TaskDraft::new("groceries").with_tags(vec!["home".into()]);
        let a = Prioritizer::default()
            .assess(&gate(ModelBundle::empty()), &draft, 3, now())
            .unwrap();
        assert_eq!(a.metadata.tags, vec!["home"]);
    }

    #[test]
    fn title_edit_keeps_score_and_suggestion() {
        let draft = TaskDraft::new("pay rent").with_due_date(now() + Duration::days(2));
        let p = Prioritizer::default();
        let a = p.assess(&gate(ModelBundle::empty()), &draft, 4, now()).unwrap();
        let mut record = stored(&a, &draft);
        record.metadata.smart_suggestion = Some(SmartSuggestion::split(4));

        let later = now() + Duration::days(1);
        let edit = TaskEdit { title: Some("pay the rent".into()), ..Default::default() };
        assert!(!p.reassess_after_edit(&mut record, &edit, later).unwrap());
        assert_eq!(record.priority_score, a.score.total_score);
        assert!(record.metadata.smart_suggestion.is_some());
        assert_eq!(record.updated_at, later);
    }

    #[test]
    fn due_date_edit_rescores_and_drops_suggestion() {
        let draft = TaskDraft::new("pay rent").with_due_date(now() + Duration::days(10));
        let p = Prioritizer::default();
        let a = p.assess(&gate(ModelBundle::empty()), &draft, 4, now()).unwrap();
        let mut record = stored(&a, &draft);
        record.metadata.smart_suggestion = Some(SmartSuggestion::split(4));
        record.metadata.extra.insert("source".into(), "voice".into());

        let edit = TaskEdit {
            due_date: Some(Some(now() + Duration::hours(6))),
            ..Default::default()
        };
        assert!(p.reassess_after_edit(&mut record, &edit, now()).unwrap());
        assert_eq!(record.priority_score, 45.0 + 15.0);
        assert_eq!(record.metadata.priority_breakdown.unwrap().urgency_score, 45.0);
        assert_eq!(record.metadata.smart_suggestion, None);
        assert_eq!(record.metadata.extra["source"], "voice");
    }

    #[test]
    fn importance_edit_drops_personalized_boost() {
        let bundle = ModelBundle::empty()
            .with_difficulty(Arc::new(fixtures::regressor(&["essay"], 60.0)));
        let draft = TaskDraft::new("essay");
        let p = Prioritizer::default();
        let a = p.assess(&gate(bundle), &draft, 5, now()).unwrap();
        assert_eq!(a.score.total_score, 25.0);
        let mut record = stored(&a, &draft);

        let edit = TaskEdit { importance: Some(4), ..Default::default() };
        assert!(p.reassess_after_edit(&mut record, &edit, now()).unwrap());
        assert_eq!(record.priority_score, 22.5);
        assert_eq!(record.metadata.priority_breakdown.unwrap().difficulty_boost, 0.0);
    }
}
