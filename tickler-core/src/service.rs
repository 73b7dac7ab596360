//! Process-wide reminder service: owns the manager and the scheduler and
//! gives the background loop an explicit lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::lifecycle::TaskManager;
use crate::scheduler::{DueTaskScheduler, SchedulerHandle, TaskDue};

pub struct ReminderService {
    manager: Arc<TaskManager>,
    scheduler: Arc<DueTaskScheduler>,
    handle: Option<SchedulerHandle>,
}

impl ReminderService {
    /// Build the service. The receiver yields a `TaskDue` per drafted due task.
    pub fn new(manager: TaskManager, interval: Duration) -> (Self, mpsc::UnboundedReceiver<TaskDue>) {
        let manager = Arc::new(manager);
        let (scheduler, events) = DueTaskScheduler::new(manager.clone());
        let service = Self {
            manager,
            scheduler: Arc::new(scheduler.with_interval(interval)),
            handle: None,
        };
        (service, events)
    }

    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    pub fn scheduler(&self) -> &Arc<DueTaskScheduler> {
        &self.scheduler
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start the scheduler loop. Returns `false` if it was already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            debug!("reminder service already running");
            return false;
        }
        self.handle = Some(self.scheduler.clone().start());
        true
    }

    /// Stop the scheduler loop and wait for it to exit. No-op when stopped.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{EmailDraft, OutgoingEmail};
    use crate::error::{Result, TaskError};
    use crate::interpreter::{Interpretation, ReminderInterpreter};
    use crate::mailer::{DeliveryReceipt, Mailer};
    use crate::store::MemoryTaskStore;
    use async_trait::async_trait;
    use chrono::Utc;

    struct NoInterpreter;
    #[async_trait]
    impl ReminderInterpreter for NoInterpreter {
        async fn interpret(&self, _text: &str) -> Result<Interpretation> {
            Err(TaskError::Interpreter("offline".to_string()))
        }
    }

    struct TemplateMailer;
    #[async_trait]
    impl Mailer for TemplateMailer {
        async fn draft(&self, description: &str, _to: &str, _due: &str) -> Result<EmailDraft> {
            EmailDraft::new(description, "reminder")
        }

        async fn send(&self, _email: &OutgoingEmail) -> Result<DeliveryReceipt> {
            Ok(DeliveryReceipt::default())
        }
    }

    fn service() -> (ReminderService, mpsc::UnboundedReceiver<TaskDue>) {
        let manager = TaskManager::new(
            Arc::new(MemoryTaskStore::new()),
            Arc::new(NoInterpreter),
            Arc::new(TemplateMailer),
            "me@example.com",
        );
        ReminderService::new(manager, Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn start_emits_due_events_and_stop_ends_loop() {
        let (mut svc, mut events) = service();
        let past = Utc::now() - chrono::Duration::minutes(5);
        let task = svc
            .manager()
            .create_from_structured("call dentist", "a@b.com", Some(past))
            .unwrap();

        assert!(svc.start());
        assert!(!svc.start());
        assert!(svc.is_running());

        let due = events.recv().await.unwrap();
        assert_eq!(due.task_id, task.id);
        assert_eq!(due.draft.subject, "call dentist");

        svc.stop().await;
        assert!(!svc.is_running());
        // Stopping twice is harmless.
        svc.stop().await;
    }
}
