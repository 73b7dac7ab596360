//! SQLite-backed [`TaskStore`].
//!
//! Timestamps are stored as fixed-width RFC3339 UTC text (`...Z`, microseconds)
//! so lexical order in SQL equals chronological order.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tickler_core::{NewTask, StatusCounts, Task, TaskError, TaskId, TaskStatus, TaskStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    description TEXT NOT NULL,
    recipient_email TEXT NOT NULL,
    due_at TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    sent_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_status_due ON tasks(status, due_at);
"#;

const COLUMNS: &str = "id, description, recipient_email, due_at, status, created_at, sent_at";

pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> tickler_core::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TaskError::Store("sqlite connection lock poisoned".to_string()))
    }
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> tickler_core::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TaskError::Store(format!("bad timestamp '{s}': {e}")))
}

fn store_err(e: rusqlite::Error) -> TaskError {
    TaskError::Store(e.to_string())
}

struct RawTask {
    id: i64,
    description: String,
    recipient_email: String,
    due_at: Option<String>,
    status: String,
    created_at: String,
    sent_at: Option<String>,
}

impl RawTask {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            description: row.get(1)?,
            recipient_email: row.get(2)?,
            due_at: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
            sent_at: row.get(6)?,
        })
    }

    fn into_task(self) -> tickler_core::Result<Task> {
        Ok(Task {
            id: TaskId(self.id),
            description: self.description,
            recipient_email: self.recipient_email,
            due_at: self.due_at.as_deref().map(parse_ts).transpose()?,
            status: self.status.parse()?,
            created_at: parse_ts(&self.created_at)?,
            sent_at: self.sent_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

fn query_tasks(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> tickler_core::Result<Vec<Task>> {
    let mut stmt = conn.prepare(sql).map_err(store_err)?;
    let rows = stmt
        .query_map(params, RawTask::from_row)
        .map_err(store_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(store_err)?;
    rows.into_iter().map(RawTask::into_task).collect()
}

fn fetch(conn: &Connection, id: TaskId) -> tickler_core::Result<Option<Task>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"),
        params![id.0],
        RawTask::from_row,
    )
    .optional()
    .map_err(store_err)?
    .map(RawTask::into_task)
    .transpose()
}

impl TaskStore for SqliteTaskStore {
    fn create(&self, task: NewTask, created_at: DateTime<Utc>) -> tickler_core::Result<Task> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tasks (description, recipient_email, due_at, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                task.description,
                task.recipient_email,
                task.due_at.map(ts),
                TaskStatus::Pending.as_str(),
                ts(created_at),
            ],
        )
        .map_err(store_err)?;
        let id = TaskId(conn.last_insert_rowid());
        Ok(task.into_task(id, created_at))
    }

    fn get(&self, id: TaskId) -> tickler_core::Result<Task> {
        fetch(&*self.conn()?, id)?.ok_or(TaskError::NotFound(id))
    }

    fn list(&self) -> tickler_core::Result<Vec<Task>> {
        query_tasks(
            &*self.conn()?,
            &format!("SELECT {COLUMNS} FROM tasks ORDER BY id"),
            [],
        )
    }

    fn list_pending_due(&self, due_before: DateTime<Utc>) -> tickler_core::Result<Vec<Task>> {
        query_tasks(
            &*self.conn()?,
            &format!(
                "SELECT {COLUMNS} FROM tasks
                 WHERE status = ?1 AND due_at IS NOT NULL AND due_at <= ?2
                 ORDER BY due_at, id"
            ),
            params![TaskStatus::Pending.as_str(), ts(due_before)],
        )
    }

    fn update_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        new: TaskStatus,
        at: DateTime<Utc>,
    ) -> tickler_core::Result<Task> {
        let conn = self.conn()?;
        if !expected.can_transition_to(new) {
            let current = fetch(&conn, id)?.ok_or(TaskError::NotFound(id))?;
            return Err(TaskError::InvalidState {
                id,
                status: current.status,
            });
        }

        let sent_at = (new == TaskStatus::Sent).then(|| ts(at));
        let changed = conn
            .execute(
                "UPDATE tasks SET status = ?1, sent_at = COALESCE(?2, sent_at)
                 WHERE id = ?3 AND status = ?4",
                params![new.as_str(), sent_at, id.0, expected.as_str()],
            )
            .map_err(store_err)?;

        match fetch(&conn, id)? {
            None => Err(TaskError::NotFound(id)),
            Some(_) if changed == 0 => Err(TaskError::Conflict(id)),
            Some(task) => Ok(task),
        }
    }

    fn count_by_status(&self) -> tickler_core::Result<StatusCounts> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;

        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            match status.parse::<TaskStatus>()? {
                TaskStatus::Pending => counts.pending = n as usize,
                TaskStatus::Sent => counts.sent = n as usize,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");

        let id = {
            let store = SqliteTaskStore::open(&path).unwrap();
            store
                .create(
                    NewTask::new("Send the slides", "bob@x.com").with_due(now()),
                    now() - Duration::hours(1),
                )
                .unwrap()
                .id
        };

        let store = SqliteTaskStore::open(&path).unwrap();
        let task = store.get(id).unwrap();
        assert_eq!(task.description, "Send the slides");
        assert_eq!(task.due_at, Some(now()));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.sent_at, None);
    }

    #[test]
    fn pending_due_is_ordered_and_skips_undated() {
        let s = SqliteTaskStore::open_in_memory().unwrap();
        let t = now();
        s.create(NewTask::new("late", "a@b.com").with_due(t - Duration::minutes(5)), t).unwrap();
        s.create(NewTask::new("early", "a@b.com").with_due(t - Duration::days(2)), t).unwrap();
        s.create(NewTask::new("tie", "a@b.com").with_due(t - Duration::minutes(5)), t).unwrap();
        s.create(NewTask::new("future", "a@b.com").with_due(t + Duration::seconds(1)), t).unwrap();
        s.create(NewTask::new("undated", "a@b.com"), t).unwrap();

        let names: Vec<String> = s
            .list_pending_due(t)
            .unwrap()
            .into_iter()
            .map(|t| t.description)
            .collect();
        assert_eq!(names, vec!["early", "late", "tie"]);
    }

    #[test]
    fn cas_marks_sent_once() {
        let s = SqliteTaskStore::open_in_memory().unwrap();
        let t = s.create(NewTask::new("a", "a@b.com").with_due(now()), now()).unwrap();

        let sent = s
            .update_status(t.id, TaskStatus::Pending, TaskStatus::Sent, now())
            .unwrap();
        assert_eq!(sent.status, TaskStatus::Sent);
        assert_eq!(sent.sent_at, Some(now()));

        let err = s
            .update_status(t.id, TaskStatus::Pending, TaskStatus::Sent, now())
            .unwrap_err();
        assert_eq!(err, TaskError::Conflict(t.id));
        assert!(s.list_pending_due(now()).unwrap().is_empty());

        let err = s
            .update_status(t.id, TaskStatus::Sent, TaskStatus::Pending, now())
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn missing_task_is_not_found() {
        let s = SqliteTaskStore::open_in_memory().unwrap();
        assert_eq!(s.get(TaskId(3)).unwrap_err(), TaskError::NotFound(TaskId(3)));
        let err = s
            .update_status(TaskId(3), TaskStatus::Pending, TaskStatus::Sent, now())
            .unwrap_err();
        assert_eq!(err, TaskError::NotFound(TaskId(3)));
    }

    #[test]
    fn counts_by_status() {
        let s = SqliteTaskStore::open_in_memory().unwrap();
        let a = s.create(NewTask::new("a", "a@b.com"), now()).unwrap();
        s.create(NewTask::new("b", "a@b.com"), now()).unwrap();
        s.create(NewTask::new("c", "a@b.com"), now()).unwrap();
        s.update_status(a.id, TaskStatus::Pending, TaskStatus::Sent, now()).unwrap();

        assert_eq!(s.count_by_status().unwrap(), StatusCounts { pending: 2, sent: 1 });
        assert_eq!(s.list().unwrap().len(), 3);
    }
}
