//! Task model for the reminder lifecycle.
//!
//! A task is created `Pending` and moves to `Sent` exactly once, after the
//! mailer confirms delivery. Storage lives behind [`crate::store::TaskStore`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::TaskError;

/// Store-assigned task identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(TaskId)
    }
}

/// Lifecycle state.
///
/// ```text
/// Pending --confirm_and_send--> Sent
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Sent,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Sent => "sent",
        }
    }

    /// Only `Pending -> Sent` is allowed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!((self, next), (TaskStatus::Pending, TaskStatus::Sent))
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "sent" => Ok(TaskStatus::Sent),
            other => Err(TaskError::Store(format!("unknown task status '{other}'"))),
        }
    }
}

/// A persisted task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub recipient_email: String,

    /// `None` means no deadline; such tasks never come due.
    pub due_at: Option<DateTime<Utc>>,

    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    /// Pending and past its deadline at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.due_at.is_some_and(|due| due <= now)
    }
}

/// Fields supplied at creation; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub description: String,
    pub recipient_email: String,
    pub due_at: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn new(description: impl Into<String>, recipient_email: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            recipient_email: recipient_email.into(),
            due_at: None,
        }
    }

    pub fn with_due(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    /// Materialize into a `Pending` task.
    pub fn into_task(self, id: TaskId, created_at: DateTime<Utc>) -> Task {
        Task {
            id,
            description: self.description,
            recipient_email: self.recipient_email,
            due_at: self.due_at,
            status: TaskStatus::Pending,
            created_at,
            sent_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn only_pending_to_sent_is_allowed() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Sent));
        assert!(!TaskStatus::Sent.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Sent.can_transition_to(TaskStatus::Sent));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn status_parses_storage_names() {
        assert_eq!("pending".parse::<TaskStatus>().unwrap(), TaskStatus::Pending);
        assert_eq!("sent".parse::<TaskStatus>().unwrap(), TaskStatus::Sent);
        assert!("confirmed".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn task_without_deadline_is_never_due() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let t = NewTask::new("call", "a@b.com").into_task(TaskId(1), now);
        assert!(!t.is_due(now + Duration::days(365)));
    }

    #[test]
    fn sent_task_is_not_due() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut t = NewTask::new("call", "a@b.com")
            .with_due(now - Duration::hours(1))
            .into_task(TaskId(1), now);
        assert!(t.is_due(now));
        t.status = TaskStatus::Sent;
        assert!(!t.is_due(now));
    }

    #[test]
    fn task_json_uses_plain_id_and_lowercase_status() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let t = NewTask::new("call", "a@b.com").into_task(TaskId(7), now);
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["id"], 7);
        assert_eq!(v["status"], "pending");
        assert_eq!(v["due_at"], serde_json::Value::Null);
        assert_eq!(v["created_at"], "2026-03-01T12:00:00Z");
    }

    #[test]
    fn task_id_accepts_hash_prefix() {
        assert_eq!("#42".parse::<TaskId>().unwrap(), TaskId(42));
    }
}
