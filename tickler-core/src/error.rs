//! Error taxonomy for task lifecycle operations.

use crate::task::{TaskId, TaskStatus};

pub type Result<T> = std::result::Result<T, TaskError>;

/// Every failure a lifecycle operation can report. Nothing is retried
/// inside the manager; callers get the variant verbatim.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    /// Bad input shape (empty description, blank text).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid recipient email '{email}'")]
    InvalidRecipient { email: String },

    /// The due date could not be pinned to one absolute instant.
    #[error("ambiguous due date '{expression}'; please clarify")]
    AmbiguousDueDate { expression: String },

    #[error("could not generate email draft: {0}")]
    DraftGeneration(String),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {id} is {status}; operation requires pending")]
    InvalidState { id: TaskId, status: TaskStatus },

    #[error("email delivery failed: {0}")]
    Delivery(String),

    /// Lost a compare-and-swap race or another confirmation is in flight.
    /// Re-fetch the task before trying again.
    #[error("task {0} was modified concurrently")]
    Conflict(TaskId),

    #[error("reminder interpreter failed: {0}")]
    Interpreter(String),

    #[error("task store error: {0}")]
    Store(String),
}

impl TaskError {
    /// Stable name for logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Validation(_) => "validation",
            TaskError::InvalidRecipient { .. } => "invalid_recipient",
            TaskError::AmbiguousDueDate { .. } => "ambiguous_due_date",
            TaskError::DraftGeneration(_) => "draft_generation",
            TaskError::NotFound(_) => "not_found",
            TaskError::InvalidState { .. } => "invalid_state",
            TaskError::Delivery(_) => "delivery",
            TaskError::Conflict(_) => "conflict",
            TaskError::Interpreter(_) => "interpreter",
            TaskError::Store(_) => "store",
        }
    }
}
