//! Task types shared by the pipeline, storage and recalculation.
//!
//! A [`TaskDraft`] is what the parser collaborator (or the CLI) hands in.
//! A [`TaskRecord`] is a stored task with its score and metadata.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ValidationError;
use crate::scoring::{ScoreBreakdown, DEFAULT_IMPORTANCE};
use crate::suggestion::SmartSuggestion;

/// Task identifier assigned by storage.
pub type TaskId = i64;

/// Accepted naive timestamp layouts, tried in order. Interpreted as UTC.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an RFC 3339 timestamp, or a naive one treated as UTC.
///
/// A bare date (`YYYY-MM-DD`) means midnight UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(ValidationError::InvalidTimestamp {
        value: value.to_string(),
    })
}

/// Clamp a caller-supplied importance onto the 1-5 scale.
///
/// Out-of-range values fall back to the default rather than the nearest
/// bound, matching how a missing importance is treated.
pub fn normalize_importance(importance: Option<i32>) -> i32 {
    match importance {
        None => DEFAULT_IMPORTANCE,
        Some(value @ 1..=5) => value,
        Some(value) => {
            warn!(importance = value, "importance outside 1-5, using default");
            DEFAULT_IMPORTANCE
        }
    }
}

/// Structured fields for a new task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default = "default_importance", deserialize_with = "deserialize_importance")]
    pub importance: i32,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_importance() -> i32 {
    DEFAULT_IMPORTANCE
}

/// Parser records may carry `null` or out-of-scale values.
fn deserialize_importance<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i32>::deserialize(deserializer).map(normalize_importance)
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            due_date: None,
            importance: DEFAULT_IMPORTANCE,
            tags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Parse and set the due date from text.
    pub fn with_due_date_str(mut self, value: &str) -> Result<Self, ValidationError> {
        self.due_date = Some(parse_timestamp(value)?);
        Ok(self)
    }

    pub fn with_importance(mut self, importance: i32) -> Self {
        self.importance = normalize_importance(Some(importance));
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Reject drafts the pipeline cannot score.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        Ok(())
    }
}

/// JSON metadata stored alongside a task.
///
/// Keys this crate does not own are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_breakdown: Option<ScoreBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_suggestion: Option<SmartSuggestion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskMetadata {
    pub fn is_empty(&self) -> bool {
        self.priority_breakdown.is_none()
            && self.smart_suggestion.is_none()
            && self.tags.is_empty()
            && self.extra.is_empty()
    }
}

/// A stored task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub importance: i32,
    pub priority_score: f64,
    pub completed: bool,
    pub metadata: TaskMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Open, dated, and not yet due.
    pub fn needs_recalculation(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due > now)
    }
}

/// Partial update to a stored task. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskEdit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// `Some(None)` clears the due date
    #[serde(default, with = "double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub importance: Option<i32>,
}

impl TaskEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.importance.is_none()
    }

    /// Whether applying this edit changes an input of the score.
    pub fn affects_priority(&self, record: &TaskRecord) -> bool {
        let due_changed = self.due_date.is_some_and(|due| due != record.due_date);
        let importance_changed = self
            .importance
            .is_some_and(|i| normalize_importance(Some(i)) != record.importance);
        due_changed || importance_changed
    }

    /// Copy the edited fields onto `record`.
    pub fn apply_to(&self, record: &mut TaskRecord) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(ValidationError::MissingTitle);
            }
            record.title = title.clone();
        }
        if let Some(description) = &self.description {
            record.description = Some(description.clone()).filter(|d| !d.is_empty());
        }
        if let Some(due_date) = self.due_date {
            record.due_date = due_date;
        }
        if let Some(importance) = self.importance {
            record.importance = normalize_importance(Some(importance));
        }
        Ok(())
    }
}

/// Distinguishes an absent field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggestion::SmartSuggestion;
    use chrono::{Duration, TimeZone};

    fn record() -> TaskRecord {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        TaskRecord {
            id: 1,
            user_id: 1,
            title: "write report".into(),
            description: None,
            due_date: Some(now + Duration::days(2)),
            importance: 3,
            priority_score: 45.0,
            completed: false,
            metadata: TaskMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn parses_rfc3339_and_naive_timestamps() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2026-03-10T09:30:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2026-03-10T11:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2026-03-10T09:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2026-03-10 09:30").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2026-03-10").unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(matches!(
            parse_timestamp("next tuesday"),
            Err(ValidationError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn importance_defaults_and_falls_back() {
        assert_eq!(normalize_importance(None), 3);
        assert_eq!(normalize_importance(Some(5)), 5);
        assert_eq!(normalize_importance(Some(0)), 3);
        assert_eq!(normalize_importance(Some(9)), 3);
        assert_eq!(TaskDraft::new("x").with_importance(-1).importance, 3);
    }

    #[test]
    fn blank_title_is_invalid() {
        assert!(matches!(
            TaskDraft::new("   ").validate(),
            Err(ValidationError::MissingTitle)
        ));
        assert!(TaskDraft::new("call mom").validate().is_ok());
    }

    #[test]
    fn draft_deserializes_with_defaults() {
        let draft: TaskDraft = serde_json::from_str(r#"{"title": "pay rent"}"#).unwrap();
        assert_eq!(draft.importance, 3);
        assert!(draft.due_date.is_none());
        assert!(draft.tags.is_empty());
    }

    #[test]
    fn draft_importance_out_of_scale_falls_back() {
        let draft: TaskDraft =
            serde_json::from_str(r#"{"title": "pay rent", "importance": 9}"#).unwrap();
        assert_eq!(draft.importance, 3);

        let draft: TaskDraft =
            serde_json::from_str(r#"{"title": "pay rent", "importance": null}"#).unwrap();
        assert_eq!(draft.importance, 3);

        let draft: TaskDraft =
            serde_json::from_str(r#"{"title": "pay rent", "importance": 5}"#).unwrap();
        assert_eq!(draft.importance, 5);
    }

    #[test]
    fn metadata_keeps_unknown_keys() {
        let json = r#"{"priority_breakdown": {"urgency_score": 45.0, "importance_score": 30.0,
            "difficulty_boost": 0.0, "dependency_score": 0.0},
            "calendar_event": "abc", "nlp": {"confidence": 0.9}}"#;
        let metadata: TaskMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.priority_breakdown.unwrap().urgency_score, 45.0);
        assert_eq!(metadata.extra["calendar_event"], "abc");

        let back = serde_json::to_value(&metadata).unwrap();
        assert_eq!(back["nlp"]["confidence"], 0.9);
        assert!(back.get("smart_suggestion").is_none());
    }

    #[test]
    fn metadata_round_trips_suggestion() {
        let metadata = TaskMetadata {
            smart_suggestion: Some(SmartSuggestion::split(4)),
            ..Default::default()
        };
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["smart_suggestion"]["type"], "split");
        let back: TaskMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn recalculation_candidate_rules() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let mut task = record();
        assert!(task.needs_recalculation(now));

        task.due_date = Some(now);
        assert!(!task.needs_recalculation(now));

        task.due_date = None;
        assert!(!task.needs_recalculation(now));

        task.due_date = Some(now + Duration::hours(1));
        task.completed = true;
        assert!(!task.needs_recalculation(now));
    }

    #[test]
    fn edit_detects_priority_inputs() {
        let task = record();
        assert!(!TaskEdit { title: Some("new".into()), ..Default::default() }.affects_priority(&task));
        assert!(!TaskEdit { importance: Some(3), ..Default::default() }.affects_priority(&task));
        assert!(TaskEdit { importance: Some(5), ..Default::default() }.affects_priority(&task));
        assert!(TaskEdit { due_date: Some(None), ..Default::default() }.affects_priority(&task));
        assert!(!TaskEdit { due_date: Some(task.due_date), ..Default::default() }.affects_priority(&task));
    }

    #[test]
    fn edit_applies_fields() {
        let mut task = record();
        TaskEdit {
            title: Some("final report".into()),
            due_date: Some(None),
            importance: Some(7),
            ..Default::default()
        }
        .apply_to(&mut task)
        .unwrap();
        assert_eq!(task.title, "final report");
        assert_eq!(task.due_date, None);
        assert_eq!(task.importance, 3);

        let blank = TaskEdit { title: Some(" ".into()), ..Default::default() };
        assert!(blank.apply_to(&mut task).is_err());
    }

    #[test]
    fn edit_json_distinguishes_null_from_missing() {
        let clear: TaskEdit = serde_json::from_str(r#"{"due_date": null}"#).unwrap();
        assert_eq!(clear.due_date, Some(None));
        let untouched: TaskEdit = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(untouched.due_date, None);
    }
}
