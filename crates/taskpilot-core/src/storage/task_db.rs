//! SQLite-based task storage.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{DatabaseError, Result, ValidationError};
use crate::pipeline::TaskAssessment;
use crate::recalc::TaskStore;
use crate::scoring::PriorityScore;
use crate::task::{TaskDraft, TaskId, TaskMetadata, TaskRecord};

const TASK_COLUMNS: &str = "id, user_id, title, description, due_date, importance,
    priority_score, completed, metadata, created_at, updated_at";

// === Helper Functions ===

/// Fixed-width UTC text so that string order matches time order.
fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(task_id: TaskId, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            DatabaseError::CorruptRow {
                task_id,
                message: format!("bad timestamp '{value}': {e}"),
            }
            .into()
        })
}

/// Row as stored, before timestamp and metadata decoding.
struct RawTask {
    id: TaskId,
    user_id: i64,
    title: String,
    description: Option<String>,
    due_date: Option<String>,
    importance: i32,
    priority_score: f64,
    completed: bool,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl RawTask {
    fn from_row(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            due_date: row.get(4)?,
            importance: row.get(5)?,
            priority_score: row.get(6)?,
            completed: row.get(7)?,
            metadata: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn decode(self) -> Result<TaskRecord> {
        let metadata: TaskMetadata =
            serde_json::from_str(&self.metadata).map_err(|e| DatabaseError::CorruptRow {
                task_id: self.id,
                message: format!("bad metadata: {e}"),
            })?;
        Ok(TaskRecord {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            due_date: self
                .due_date
                .as_deref()
                .map(|d| parse_ts(self.id, d))
                .transpose()?,
            importance: self.importance,
            priority_score: self.priority_score,
            completed: self.completed,
            metadata,
            created_at: parse_ts(self.id, &self.created_at)?,
            updated_at: parse_ts(self.id, &self.updated_at)?,
        })
    }
}

/// Which tasks [`TaskDb::list_tasks`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskFilter {
    #[default]
    Open,
    Completed,
    All,
}

impl TaskFilter {
    fn clause(&self) -> &'static str {
        match self {
            TaskFilter::Open => "AND completed = 0",
            TaskFilter::Completed => "AND completed = 1",
            TaskFilter::All => "",
        }
    }
}

/// SQLite database for task storage.
///
/// Each statement autocommits unless noted, so a crash loses at most the
/// write in progress.
pub struct TaskDb {
    conn: Connection,
}

impl TaskDb {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL,
                title           TEXT NOT NULL,
                description     TEXT,
                due_date        TEXT,
                importance      INTEGER NOT NULL DEFAULT 3,
                priority_score  REAL NOT NULL DEFAULT 0,
                completed       INTEGER NOT NULL DEFAULT 0,
                metadata        TEXT NOT NULL DEFAULT '{}',
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_user_priority
                ON tasks(user_id, completed, priority_score DESC);
            CREATE INDEX IF NOT EXISTS idx_tasks_open_due
                ON tasks(completed, due_date);",
        )
    }

    /// Insert a task and store its assessment in one transaction.
    ///
    /// `assess` receives the new row id, so suggestions can reference the
    /// task they belong to.
    ///
    /// # Errors
    /// Returns an error if the draft is invalid, `assess` fails, or a write
    /// fails. Nothing is stored in that case.
    pub fn insert_assessed<F>(
        &self,
        user_id: i64,
        draft: &TaskDraft,
        now: DateTime<Utc>,
        assess: F,
    ) -> Result<TaskRecord>
    where
        F: FnOnce(TaskId) -> Result<TaskAssessment>,
    {
        draft.validate()?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO tasks (user_id, title, description, due_date, importance,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                user_id,
                draft.title,
                draft.description,
                draft.due_date.map(format_ts),
                draft.importance,
                format_ts(now),
            ],
        )?;
        let id = tx.last_insert_rowid();

        let assessment = assess(id)?;
        tx.execute(
            "UPDATE tasks SET importance = ?1, priority_score = ?2, metadata = ?3 WHERE id = ?4",
            params![
                assessment.importance,
                assessment.score.total_score,
                serde_json::to_string(&assessment.metadata)?,
                id,
            ],
        )?;
        tx.commit()?;
        debug!(task_id = id, user_id, "inserted task");

        self.require_task(id)
    }

    pub fn get_task(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                RawTask::from_row,
            )
            .optional()?;
        raw.map(RawTask::decode).transpose()
    }

    /// Like [`get_task`](Self::get_task), failing when the task is missing.
    pub fn require_task(&self, id: TaskId) -> Result<TaskRecord> {
        self.get_task(id)?
            .ok_or_else(|| ValidationError::TaskNotFound(id).into())
    }

    /// A user's tasks, highest priority first, then soonest due.
    pub fn list_tasks(&self, user_id: i64, filter: TaskFilter) -> Result<Vec<TaskRecord>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1 {}
             ORDER BY completed ASC, priority_score DESC, due_date IS NULL, due_date ASC, id ASC",
            filter.clause()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], RawTask::from_row)?;
        let tasks = rows
            .map(|row| row.map_err(Into::into).and_then(RawTask::decode))
            .collect::<Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// Overwrite every mutable column from `record`.
    ///
    /// # Errors
    /// Returns `TaskNotFound` if no row has `record.id`.
    pub fn update_task(&self, record: &TaskRecord) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE tasks SET title = ?1, description = ?2, due_date = ?3, importance = ?4,
                              priority_score = ?5, completed = ?6, metadata = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                record.title,
                record.description,
                record.due_date.map(format_ts),
                record.importance,
                record.priority_score,
                record.completed,
                serde_json::to_string(&record.metadata)?,
                format_ts(record.updated_at),
                record.id,
            ],
        )?;
        if changed == 0 {
            return Err(ValidationError::TaskNotFound(record.id).into());
        }
        Ok(())
    }

    /// Remove a task.
    ///
    /// # Errors
    /// Returns `TaskNotFound` if no row has `id`.
    pub fn delete_task(&self, id: TaskId) -> Result<()> {
        let changed = self.conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(ValidationError::TaskNotFound(id).into());
        }
        debug!(task_id = id, "deleted task");
        Ok(())
    }

    pub fn set_completed(&self, id: TaskId, completed: bool, now: DateTime<Utc>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE tasks SET completed = ?1, updated_at = ?2 WHERE id = ?3",
            params![completed, format_ts(now), id],
        )?;
        if changed == 0 {
            return Err(ValidationError::TaskNotFound(id).into());
        }
        Ok(())
    }
}

impl TaskStore for TaskDb {
    fn recalculation_candidates(&self, now: DateTime<Utc>) -> Result<Vec<TaskRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE completed = 0 AND due_date IS NOT NULL AND due_date > ?1
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![format_ts(now)], RawTask::from_row)?;
        let tasks = rows
            .map(|row| row.map_err(Into::into).and_then(RawTask::decode))
            .collect::<Result<Vec<_>>>()?;
        Ok(tasks)
    }

    fn write_priority(&self, task: &TaskRecord, score: &PriorityScore) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET priority_score = ?1,
                 metadata = json_set(metadata, '$.priority_breakdown', json(?2))
             WHERE id = ?3 AND completed = 0 AND due_date IS ?4 AND importance = ?5",
            params![
                score.total_score,
                serde_json::to_string(&score.breakdown)?,
                task.id,
                task.due_date.map(format_ts),
                task.importance,
            ],
        )?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personalization::{GateThresholds, ModelBundle, PersonalizationGate};
    use crate::pipeline::Prioritizer;
    use crate::task::TaskEdit;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn add(db: &TaskDb, user_id: i64, draft: TaskDraft) -> TaskRecord {
        let gate = PersonalizationGate::new(user_id, Arc::new(ModelBundle::empty()), GateThresholds::default());
        db.insert_assessed(user_id, &draft, now(), |id| {
            Prioritizer::default().assess(&gate, &draft, id, now())
        })
        .unwrap()
    }

    #[test]
    fn insert_stores_assessment() {
        let db = TaskDb::open_memory().unwrap();
        let task = add(
            &db,
            1,
            TaskDraft::new("pay rent")
                .with_due_date(now() + Duration::hours(12))
                .with_importance(5)
                .with_tags(vec!["home".into()]),
        );
        assert_eq!(task.priority_score, 75.0);
        assert_eq!(task.importance, 5);
        assert_eq!(task.metadata.tags, vec!["home"]);
        assert_eq!(task.metadata.priority_breakdown.unwrap().urgency_score, 45.0);
        assert_eq!(task.due_date, Some(now() + Duration::hours(12)));
        assert_eq!(task.created_at, now());
    }

    #[test]
    fn failed_assessment_rolls_back() {
        let db = TaskDb::open_memory().unwrap();
        let result = db.insert_assessed(1, &TaskDraft::new("x"), now(), |_| {
            Err(ValidationError::MissingTitle.into())
        });
        assert!(result.is_err());
        assert!(db.list_tasks(1, TaskFilter::All).unwrap().is_empty());
    }

    #[test]
    fn list_orders_by_priority_then_due() {
        let db = TaskDb::open_memory().unwrap();
        add(&db, 1, TaskDraft::new("later").with_due_date(now() + Duration::days(10)));
        add(&db, 1, TaskDraft::new("urgent").with_due_date(now() + Duration::hours(3)));
        add(&db, 1, TaskDraft::new("undated"));
        add(&db, 1, TaskDraft::new("also later").with_due_date(now() + Duration::days(9)));
        add(&db, 2, TaskDraft::new("someone else"));

        let titles: Vec<_> = db
            .list_tasks(1, TaskFilter::Open)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["urgent", "also later", "later", "undated"]);
    }

    #[test]
    fn completion_moves_between_filters() {
        let db = TaskDb::open_memory().unwrap();
        let task = add(&db, 1, TaskDraft::new("file taxes"));
        db.set_completed(task.id, true, now()).unwrap();
        assert!(db.list_tasks(1, TaskFilter::Open).unwrap().is_empty());
        assert_eq!(db.list_tasks(1, TaskFilter::Completed).unwrap().len(), 1);
        assert!(matches!(
            db.set_completed(999, true, now()),
            Err(crate::CoreError::Validation(ValidationError::TaskNotFound(999)))
        ));
    }

    #[test]
    fn update_persists_edit_and_keeps_unknown_metadata() {
        let db = TaskDb::open_memory().unwrap();
        let mut task = add(&db, 1, TaskDraft::new("draft memo").with_due_date(now() + Duration::days(20)));
        task.metadata.extra.insert("source".into(), "voice".into());
        db.update_task(&task).unwrap();

        let edit = TaskEdit { due_date: Some(Some(now() + Duration::hours(2))), ..Default::default() };
        Prioritizer::default().reassess_after_edit(&mut task, &edit, now()).unwrap();
        db.update_task(&task).unwrap();

        let stored = db.require_task(task.id).unwrap();
        assert_eq!(stored.priority_score, 60.0);
        assert_eq!(stored.metadata.extra["source"], "voice");
        assert_eq!(stored.due_date, Some(now() + Duration::hours(2)));
    }

    #[test]
    fn candidates_are_open_and_strictly_future() {
        let db = TaskDb::open_memory().unwrap();
        let future = add(&db, 1, TaskDraft::new("future").with_due_date(now() + Duration::seconds(1)));
        add(&db, 1, TaskDraft::new("due now").with_due_date(now()));
        add(&db, 1, TaskDraft::new("undated"));
        let done = add(&db, 1, TaskDraft::new("done").with_due_date(now() + Duration::days(1)));
        db.set_completed(done.id, true, now()).unwrap();

        let ids: Vec<_> = db
            .recalculation_candidates(now())
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![future.id]);
    }

    #[test]
    fn write_priority_patches_breakdown_only() {
        let db = TaskDb::open_memory().unwrap();
        let mut task = add(&db, 1, TaskDraft::new("memo").with_due_date(now() + Duration::days(5)));
        task.metadata.extra.insert("calendar_event".into(), "evt-1".into());
        db.update_task(&task).unwrap();

        let score = crate::pipeline::rescore_plain(&task, now() + Duration::days(4));
        assert!(db.write_priority(&task, &score).unwrap());

        let stored = db.require_task(task.id).unwrap();
        assert_eq!(stored.priority_score, 60.0);
        assert_eq!(stored.metadata.priority_breakdown, Some(score.breakdown));
        assert_eq!(stored.metadata.extra["calendar_event"], "evt-1");
        assert_eq!(stored.metadata.tags, task.metadata.tags);
    }

    #[test]
    fn write_priority_skips_task_edited_since_read() {
        let db = TaskDb::open_memory().unwrap();
        add(&db, 1, TaskDraft::new("renew visa").with_due_date(now() + Duration::days(5)));
        let read = db.recalculation_candidates(now()).unwrap().remove(0);

        // user pushes the deadline out before the stale write arrives
        let mut edited = read.clone();
        let edit = TaskEdit { due_date: Some(Some(now() + Duration::days(20))), ..Default::default() };
        Prioritizer::default().reassess_after_edit(&mut edited, &edit, now()).unwrap();
        db.update_task(&edited).unwrap();
        assert_eq!(edited.priority_score, 15.0);

        let stale = crate::pipeline::rescore_plain(&read, now() + Duration::days(4));
        assert_eq!(stale.total_score, 60.0);
        assert!(!db.write_priority(&read, &stale).unwrap());

        let stored = db.require_task(read.id).unwrap();
        assert_eq!(stored.priority_score, 15.0);
        assert_eq!(stored.due_date, Some(now() + Duration::days(20)));

        // completed or deleted tasks are skipped too
        let current = db.require_task(read.id).unwrap();
        db.set_completed(current.id, true, now()).unwrap();
        assert!(!db.write_priority(&current, &stale).unwrap());
        db.delete_task(current.id).unwrap();
        assert!(!db.write_priority(&current, &stale).unwrap());
    }

    #[test]
    fn all_filter_lists_open_before_completed() {
        let db = TaskDb::open_memory().unwrap();
        let urgent = add(&db, 1, TaskDraft::new("urgent").with_due_date(now() + Duration::hours(3)));
        add(&db, 1, TaskDraft::new("undated"));
        db.set_completed(urgent.id, true, now()).unwrap();

        let titles: Vec<_> = db
            .list_tasks(1, TaskFilter::All)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["undated", "urgent"]);
    }

    #[test]
    fn delete_removes_task() {
        let db = TaskDb::open_memory().unwrap();
        let task = add(&db, 1, TaskDraft::new("cancel gym"));
        db.delete_task(task.id).unwrap();
        assert!(db.get_task(task.id).unwrap().is_none());
        assert!(matches!(
            db.delete_task(task.id),
            Err(crate::CoreError::Validation(ValidationError::TaskNotFound(_)))
        ));
    }

    #[test]
    fn open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        {
            let db = TaskDb::open(&path).unwrap();
            add(&db, 1, TaskDraft::new("persist me"));
        }
        let db = TaskDb::open(&path).unwrap();
        assert_eq!(db.list_tasks(1, TaskFilter::All).unwrap().len(), 1);
    }
}
