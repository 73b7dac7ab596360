//! tickler-core: task lifecycle and due-task scheduling for the Tickler
//! reminder service.
//!
//! The store, the reminder interpreter and the mailer are traits; adapters
//! live in the CLI crate.

pub mod email;
pub mod error;
pub mod interpreter;
pub mod lifecycle;
pub mod mailer;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod task;
pub mod time;

pub use email::{EmailDraft, OutgoingEmail, is_valid_email, parse_draft};
pub use error::{Result, TaskError};
pub use interpreter::{DueHint, Interpretation, ReminderInterpreter, parse_interpretation};
pub use lifecycle::{SendConfirmation, TaskAnalytics, TaskManager};
pub use mailer::{DeliveryReceipt, Mailer};
pub use scheduler::{DEFAULT_TICK_INTERVAL, DueTaskScheduler, SchedulerHandle, TaskDue, TickReport};
pub use service::ReminderService;
pub use store::{MemoryTaskStore, StatusCounts, TaskStore};
pub use task::{NewTask, Task, TaskId, TaskStatus};
pub use time::{Clock, DueDateResolver, NO_DUE_DATE, SystemClock};
