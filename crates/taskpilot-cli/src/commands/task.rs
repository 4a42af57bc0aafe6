//! Task management commands for CLI.

use clap::Subcommand;
use taskpilot_core::task::parse_timestamp;
use taskpilot_core::{Config, TaskDraft, TaskEdit, TaskFilter};
use tracing::info;

use super::{open_db, personalization, print_json, resolve_now, CmdResult};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a task and score it
    Add {
        /// Task title
        title: String,
        /// Task description
        #[arg(long)]
        description: Option<String>,
        /// Due date (RFC 3339, "YYYY-MM-DD HH:MM" or "YYYY-MM-DD")
        #[arg(long)]
        due: Option<String>,
        /// Importance 1-5 (default: 3)
        #[arg(long)]
        importance: Option<i32>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
        /// Owner
        #[arg(long, default_value_t = 1)]
        user: i64,
        /// Evaluate as of this instant instead of now
        #[arg(long)]
        now: Option<String>,
    },
    /// List tasks by priority
    List {
        #[arg(long, default_value_t = 1)]
        user: i64,
        /// Include completed tasks
        #[arg(long, conflicts_with = "completed")]
        all: bool,
        /// Only completed tasks
        #[arg(long)]
        completed: bool,
    },
    /// Get task details
    Get {
        /// Task ID
        id: i64,
    },
    /// Edit a task, rescoring when due date or importance change
    Edit {
        /// Task ID
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        /// Remove the due date
        #[arg(long)]
        clear_due: bool,
        #[arg(long)]
        importance: Option<i32>,
        #[arg(long)]
        now: Option<String>,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: i64,
    },
    /// Mark a task completed
    Complete {
        /// Task ID
        id: i64,
        /// Reopen instead
        #[arg(long)]
        undo: bool,
    },
}

pub fn run(action: TaskAction) -> CmdResult {
    let config = Config::load()?;
    let db = open_db(&config)?;

    match action {
        TaskAction::Add {
            title,
            description,
            due,
            importance,
            tags,
            user,
            now,
        } => {
            let now = resolve_now(now.as_deref())?;
            let mut draft = TaskDraft::new(title);
            if let Some(d) = description {
                draft = draft.with_description(d);
            }
            if let Some(d) = due {
                draft = draft.with_due_date_str(&d)?;
            }
            if let Some(i) = importance {
                draft = draft.with_importance(i);
            }
            if let Some(t) = tags {
                draft = draft.with_tags(split_tags(&t));
            }

            let service = personalization(&config)?;
            let gate = service.for_user(user);
            let prioritizer = config.prioritizer();
            let task = db.insert_assessed(user, &draft, now, |id| {
                prioritizer.assess(&gate, &draft, id, now)
            })?;
            info!(task_id = task.id, score = task.priority_score, "task created");
            print_json(&task)?;
        }
        TaskAction::List {
            user,
            all,
            completed,
        } => {
            let filter = if all {
                TaskFilter::All
            } else if completed {
                TaskFilter::Completed
            } else {
                TaskFilter::Open
            };
            print_json(&db.list_tasks(user, filter)?)?;
        }
        TaskAction::Get { id } => {
            print_json(&db.require_task(id)?)?;
        }
        TaskAction::Edit {
            id,
            title,
            description,
            due,
            clear_due,
            importance,
            now,
        } => {
            let now = resolve_now(now.as_deref())?;
            let due_date = if clear_due {
                Some(None)
            } else {
                due.as_deref().map(parse_timestamp).transpose()?.map(Some)
            };
            let edit = TaskEdit {
                title,
                description,
                due_date,
                importance,
            };
            if edit.is_empty() {
                return Err("nothing to edit".into());
            }

            let mut task = db.require_task(id)?;
            let rescored = config.prioritizer().reassess_after_edit(&mut task, &edit, now)?;
            db.update_task(&task)?;
            info!(task_id = id, rescored, "task updated");
            print_json(&task)?;
        }
        TaskAction::Delete { id } => {
            db.delete_task(id)?;
            info!(task_id = id, "task deleted");
            println!("Task deleted: {id}");
        }
        TaskAction::Complete { id, undo } => {
            db.set_completed(id, !undo, chrono::Utc::now())?;
            print_json(&db.require_task(id)?)?;
        }
    }
    Ok(())
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
