//! Task lifecycle manager.
//!
//! Owns every status transition. Orchestrates the store, the reminder
//! interpreter and the mailer without holding any store lock across an
//! external call:
//!
//! - creation validates input and resolves the due date up front, so no
//!   incomplete task is ever persisted
//! - confirmation claims the task id, sends, then CAS-updates `pending -> sent`
//! - the claim is released on drop, so a cancelled send leaves the task pending

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::email::{EmailDraft, OutgoingEmail, is_valid_email};
use crate::error::{Result, TaskError};
use crate::interpreter::{DueHint, ReminderInterpreter};
use crate::mailer::Mailer;
use crate::store::TaskStore;
use crate::task::{NewTask, Task, TaskId, TaskStatus};
use crate::time::{Clock, DueDateResolver, SystemClock};

/// Result of a successful `confirm_and_send`.
#[derive(Debug, Clone, PartialEq)]
pub struct SendConfirmation {
    /// The task as persisted after the transition.
    pub task: Task,
    pub subject: String,
    pub provider_id: Option<String>,
}

/// Read-only counts for dashboards and `stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskAnalytics {
    pub total: usize,
    pub pending: usize,
    pub sent: usize,
    /// Pending tasks whose deadline has passed.
    pub overdue: usize,
}

pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    interpreter: Arc<dyn ReminderInterpreter>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    resolver: DueDateResolver,
    sender_email: String,
    in_flight: Mutex<HashSet<TaskId>>,
}

impl TaskManager {
    pub fn new(
        store: Arc<dyn TaskStore>,
        interpreter: Arc<dyn ReminderInterpreter>,
        mailer: Arc<dyn Mailer>,
        sender_email: impl Into<String>,
    ) -> Self {
        Self {
            store,
            interpreter,
            mailer,
            clock: Arc::new(SystemClock),
            resolver: DueDateResolver::default(),
            sender_email: sender_email.into(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_resolver(mut self, resolver: DueDateResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn resolver(&self) -> &DueDateResolver {
        &self.resolver
    }

    /// Resolve a due expression against the manager's clock.
    pub fn resolve_due(&self, expression: &str) -> Result<DateTime<Utc>> {
        self.resolver.resolve(expression, self.clock.now())
    }

    pub fn create_from_structured(
        &self,
        description: &str,
        recipient_email: &str,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<Task> {
        let description = description.trim();
        if description.is_empty() {
            return Err(TaskError::Validation("description must not be empty".to_string()));
        }

        let mut new_task = NewTask::new(description, recipient_email.trim());
        new_task.due_at = due_at;

        let task = self.store.create(new_task, self.clock.now())?;
        info!(
            task_id = %task.id,
            recipient = %task.recipient_email,
            due_at = ?task.due_at,
            "task created"
        );
        Ok(task)
    }

    /// Interpret free text and create a task from it.
    ///
    /// `explicit_due_at` wins over anything the interpreter reports.
    pub async fn create_from_reminder_text(
        &self,
        text: &str,
        explicit_due_at: Option<DateTime<Utc>>,
    ) -> Result<Task> {
        if text.trim().is_empty() {
            return Err(TaskError::Validation("reminder text must not be empty".to_string()));
        }

        let interpretation = self.interpreter.interpret(text).await?;
        debug!(?interpretation, "reminder interpreted");

        let due_at = match (explicit_due_at, &interpretation.due) {
            (Some(explicit), _) => Some(explicit),
            (None, DueHint::None) => None,
            (None, DueHint::Ambiguous) => {
                return Err(TaskError::AmbiguousDueDate {
                    expression: "ambiguous".to_string(),
                });
            }
            (None, DueHint::Expression(expr)) => Some(self.resolve_due(expr)?),
        };

        let recipient = match interpretation.recipient_email {
            Some(email) if is_valid_email(&email) => email,
            other => {
                return Err(TaskError::InvalidRecipient {
                    email: other.unwrap_or_else(|| "none".to_string()),
                });
            }
        };

        self.create_from_structured(&interpretation.description, &recipient, due_at)
    }

    pub fn get_task(&self, id: TaskId) -> Result<Task> {
        self.store.get(id)
    }

    /// Draft via the mailer. Any drafting failure is `DraftGeneration`.
    pub async fn draft_email(&self, task: &Task) -> Result<EmailDraft> {
        let due_rendering = self.resolver.render(task.due_at);
        let draft = self
            .mailer
            .draft(&task.description, &task.recipient_email, &due_rendering)
            .await
            .map_err(|e| match e {
                TaskError::DraftGeneration(_) => e,
                other => TaskError::DraftGeneration(other.to_string()),
            })?;
        // Adapters are not trusted to enforce non-empty fields.
        EmailDraft::new(draft.subject, draft.body)
    }

    /// Deliver the task's email and mark it sent.
    ///
    /// Overrides are used only when both subject and body are non-blank.
    ///
    /// The in-flight claim is per process. Two processes sharing one store can
    /// both deliver; the loser only sees `Conflict` at the status update.
    pub async fn confirm_and_send(
        &self,
        id: TaskId,
        override_subject: Option<String>,
        override_body: Option<String>,
    ) -> Result<SendConfirmation> {
        let _claim = self.claim(id)?;

        // Read after claiming: a confirmation that finished before our claim
        // has already flipped the status.
        let task = self.store.get(id)?;
        if task.status != TaskStatus::Pending {
            return Err(TaskError::InvalidState {
                id,
                status: task.status,
            });
        }
        if !is_valid_email(&task.recipient_email) {
            return Err(TaskError::InvalidRecipient {
                email: task.recipient_email.clone(),
            });
        }

        let non_blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        let draft = match (non_blank(override_subject), non_blank(override_body)) {
            (Some(subject), Some(body)) => EmailDraft::new(subject, body)
                .map_err(|e| TaskError::Validation(format!("override rejected: {e}")))?,
            (subject, body) => {
                if subject.is_some() || body.is_some() {
                    debug!(task_id = %id, "partial override ignored; drafting");
                }
                self.draft_email(&task).await?
            }
        };

        let outgoing = OutgoingEmail {
            to: task.recipient_email.clone(),
            from: self.sender_email.clone(),
            subject: draft.subject.clone(),
            body: draft.body,
        };

        let receipt = match self.mailer.send(&outgoing).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let e = match e {
                    TaskError::Delivery(_) | TaskError::InvalidRecipient { .. } => e,
                    other => TaskError::Delivery(other.to_string()),
                };
                warn!(task_id = %id, kind = e.kind(), error = %e, "delivery failed; task stays pending");
                return Err(e);
            }
        };

        let sent = self
            .store
            .update_status(id, TaskStatus::Pending, TaskStatus::Sent, self.clock.now())
            .inspect_err(|e| {
                error!(task_id = %id, error = %e, "email delivered but status update failed");
            })?;

        info!(task_id = %id, recipient = %sent.recipient_email, "task sent");
        Ok(SendConfirmation {
            task: sent,
            subject: draft.subject,
            provider_id: receipt.provider_id,
        })
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        self.store.list()
    }

    /// Pending tasks due at or before `now`, in scan order.
    pub fn due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        self.store.list_pending_due(now)
    }

    pub fn analytics(&self) -> Result<TaskAnalytics> {
        let counts = self.store.count_by_status()?;
        let overdue = self.store.list_pending_due(self.clock.now())?.len();
        Ok(TaskAnalytics {
            total: counts.total(),
            pending: counts.pending,
            sent: counts.sent,
            overdue,
        })
    }

    fn claim(&self, id: TaskId) -> Result<InFlightClaim<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(id) {
            debug!(task_id = %id, "confirmation already in flight");
            return Err(TaskError::Conflict(id));
        }
        Ok(InFlightClaim {
            set: &self.in_flight,
            id,
        })
    }
}

/// Marks a task as having a send outstanding. Released on drop.
struct InFlightClaim<'a> {
    set: &'a Mutex<HashSet<TaskId>>,
    id: TaskId,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.id);
    }
}
