//! Task store contract + an in-memory implementation.
//!
//! Status changes go through [`TaskStore::update_status`], a compare-and-swap:
//! the update applies only if the stored status still equals `expected`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::{Result, TaskError};
use crate::task::{NewTask, Task, TaskId, TaskStatus};

/// Per-status counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub sent: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.sent
    }
}

pub trait TaskStore: Send + Sync {
    /// Persist a new `Pending` task and return it with its assigned id.
    fn create(&self, task: NewTask, created_at: DateTime<Utc>) -> Result<Task>;

    /// `TaskError::NotFound` if absent.
    fn get(&self, id: TaskId) -> Result<Task>;

    /// All tasks ordered by id.
    fn list(&self) -> Result<Vec<Task>>;

    /// Pending tasks with `due_at <= due_before`, ordered by `(due_at, id)`.
    fn list_pending_due(&self, due_before: DateTime<Utc>) -> Result<Vec<Task>>;

    /// CAS on status. `Conflict` if the stored status is not `expected`,
    /// `InvalidState` if `expected -> new` is not a legal transition.
    /// `at` becomes `sent_at` when moving to `Sent`.
    fn update_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        new: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<Task>;

    fn count_by_status(&self) -> Result<StatusCounts>;
}

/// Ids start at 1 and only grow; removal is not offered.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: i64,
    tasks: BTreeMap<TaskId, Task>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| TaskError::Store("memory store lock poisoned".to_string()))
    }
}

impl TaskStore for MemoryTaskStore {
    fn create(&self, task: NewTask, created_at: DateTime<Utc>) -> Result<Task> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = TaskId(inner.next_id);
        let task = task.into_task(id, created_at);
        inner.tasks.insert(id, task.clone());
        Ok(task)
    }

    fn get(&self, id: TaskId) -> Result<Task> {
        self.lock()?
            .tasks
            .get(&id)
            .cloned()
            .ok_or(TaskError::NotFound(id))
    }

    fn list(&self) -> Result<Vec<Task>> {
        Ok(self.lock()?.tasks.values().cloned().collect())
    }

    fn list_pending_due(&self, due_before: DateTime<Utc>) -> Result<Vec<Task>> {
        let inner = self.lock()?;
        let mut due: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.is_due(due_before))
            .cloned()
            .collect();
        due.sort_by_key(|t| (t.due_at, t.id));
        Ok(due)
    }

    fn update_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        new: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<Task> {
        let mut inner = self.lock()?;
        let task = inner.tasks.get_mut(&id).ok_or(TaskError::NotFound(id))?;
        if !expected.can_transition_to(new) {
            return Err(TaskError::InvalidState {
                id,
                status: task.status,
            });
        }
        if task.status != expected {
            return Err(TaskError::Conflict(id));
        }
        task.status = new;
        if new == TaskStatus::Sent {
            task.sent_at = Some(at);
        }
        Ok(task.clone())
    }

    fn count_by_status(&self) -> Result<StatusCounts> {
        let inner = self.lock()?;
        let mut counts = StatusCounts::default();
        for t in inner.tasks.values() {
            match t.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Sent => counts.sent += 1,
            }
        }
        Ok(counts)
    }
}
