//! Due-task scheduler.
//!
//! Every tick snapshots "now", asks the manager for pending tasks whose
//! deadline has passed, drafts an email for each and emits a [`TaskDue`]
//! event. Tasks are never mutated here: a due task keeps re-surfacing on
//! every tick until an operator confirms it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::email::EmailDraft;
use crate::error::TaskError;
use crate::lifecycle::TaskManager;
use crate::task::TaskId;

/// Interval between scheduler ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// A pending task past its deadline, with a delivery-ready draft.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDue {
    pub task_id: TaskId,
    pub recipient_email: String,
    pub due_at: DateTime<Utc>,
    pub draft: EmailDraft,
    pub detected_at: DateTime<Utc>,
}

/// Summary of one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick_at: DateTime<Utc>,
    /// Due task ids in scan order (`due_at`, then id).
    pub due: Vec<TaskId>,
    pub drafted: Vec<TaskDue>,
    pub failures: Vec<(TaskId, TaskError)>,
    /// Set when the store query itself failed.
    pub scan_error: Option<TaskError>,
}

impl TickReport {
    fn new(tick_at: DateTime<Utc>) -> Self {
        Self {
            tick_at,
            due: Vec::new(),
            drafted: Vec::new(),
            failures: Vec::new(),
            scan_error: None,
        }
    }
}

pub struct DueTaskScheduler {
    manager: Arc<TaskManager>,
    interval: Duration,
    events: mpsc::UnboundedSender<TaskDue>,
    running: AtomicBool,
    skipped: AtomicU64,
}

impl DueTaskScheduler {
    /// Create a scheduler and the receiving end of its event channel.
    pub fn new(manager: Arc<TaskManager>) -> (Self, mpsc::UnboundedReceiver<TaskDue>) {
        let (events, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            manager,
            interval: DEFAULT_TICK_INTERVAL,
            events,
            running: AtomicBool::new(false),
            skipped: AtomicU64::new(0),
        };
        (scheduler, rx)
    }

    /// Override the tick interval. Zero is bumped to one second.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_secs(1));
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks skipped because the previous one was still running.
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Run one scan at the manager's current time.
    pub async fn tick(&self) -> Option<TickReport> {
        self.tick_at(self.manager.now()).await
    }

    /// Run one scan at `now`. Returns `None` if another tick is in progress;
    /// overlapping ticks are skipped, never queued.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Option<TickReport> {
        let Some(_running) = TickGuard::acquire(&self.running) else {
            let skipped = self.skipped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(skipped, "scheduler tick skipped; previous tick still running");
            return None;
        };

        let mut report = TickReport::new(now);
        let due = match self.manager.due_tasks(now) {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "due-task scan failed");
                report.scan_error = Some(e);
                return Some(report);
            }
        };
        debug!(count = due.len(), "due-task scan");

        for task in due {
            report.due.push(task.id);
            // Store contract guarantees due_at is set for due tasks.
            let Some(due_at) = task.due_at else { continue };

            match self.manager.draft_email(&task).await {
                Ok(draft) => {
                    let event = TaskDue {
                        task_id: task.id,
                        recipient_email: task.recipient_email.clone(),
                        due_at,
                        draft,
                        detected_at: now,
                    };
                    if self.events.send(event.clone()).is_err() {
                        debug!(task_id = %task.id, "no listener for due-task events");
                    }
                    report.drafted.push(event);
                }
                Err(e) => {
                    warn!(task_id = %task.id, kind = e.kind(), error = %e, "draft failed for due task");
                    report.failures.push((task.id, e));
                }
            }
        }

        if !report.due.is_empty() {
            info!(
                due = report.due.len(),
                drafted = report.drafted.len(),
                failed = report.failures.len(),
                "due-task tick complete"
            );
        }
        Some(report)
    }

    /// Spawn the background loop on the current tokio runtime.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = self;

        let join = tokio::spawn(async move {
            info!(interval_secs = scheduler.interval.as_secs(), "due-task scheduler started");
            let mut interval = tokio::time::interval(scheduler.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }
                scheduler.tick().await;
            }
            info!("due-task scheduler stopped");
        });

        SchedulerHandle { shutdown_tx, join }
    }
}

/// Handle to a running scheduler loop.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal shutdown and wait for the in-progress tick (if any) to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "scheduler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::OutgoingEmail;
    use crate::error::Result;
    use crate::interpreter::{Interpretation, ReminderInterpreter};
    use crate::mailer::{DeliveryReceipt, Mailer};
    use crate::store::MemoryTaskStore;
    use crate::time::Clock;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tokio::sync::Notify;

    struct FixedClock(DateTime<Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct NoInterpreter;
    #[async_trait]
    impl ReminderInterpreter for NoInterpreter {
        async fn interpret(&self, _text: &str) -> Result<Interpretation> {
            Err(TaskError::Interpreter("not configured".to_string()))
        }
    }

    /// Drafts fail for descriptions containing "broken"; "slow" waits on `gate`.
    #[derive(Default)]
    struct PickyMailer {
        gate: Notify,
        entered: Notify,
    }

    #[async_trait]
    impl Mailer for PickyMailer {
        async fn draft(&self, description: &str, _to: &str, _due: &str) -> Result<EmailDraft> {
            if description.contains("slow") {
                self.entered.notify_one();
                self.gate.notified().await;
            }
            if description.contains("broken") {
                return Err(TaskError::DraftGeneration("model returned prose".to_string()));
            }
            EmailDraft::new(format!("Due: {description}"), "body")
        }

        async fn send(&self, _email: &OutgoingEmail) -> Result<DeliveryReceipt> {
            Ok(DeliveryReceipt::default())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap()
    }

    fn setup(mailer: Arc<PickyMailer>) -> (Arc<TaskManager>, DueTaskScheduler, mpsc::UnboundedReceiver<TaskDue>) {
        let manager = Arc::new(
            TaskManager::new(
                Arc::new(MemoryTaskStore::new()),
                Arc::new(NoInterpreter),
                mailer,
                "me@example.com",
            )
            .with_clock(Arc::new(FixedClock(now()))),
        );
        let (scheduler, rx) = DueTaskScheduler::new(manager.clone());
        (manager, scheduler, rx)
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_scan() {
        let (m, s, mut rx) = setup(Arc::new(PickyMailer::default()));
        let a = m
            .create_from_structured("first", "a@b.com", Some(now() - ChronoDuration::hours(3)))
            .unwrap();
        let b = m
            .create_from_structured("broken", "a@b.com", Some(now() - ChronoDuration::hours(2)))
            .unwrap();
        let c = m
            .create_from_structured("third", "a@b.com", Some(now() - ChronoDuration::hours(1)))
            .unwrap();
        m.create_from_structured("later", "a@b.com", Some(now() + ChronoDuration::hours(1)))
            .unwrap();

        let report = s.tick().await.unwrap();
        assert_eq!(report.due, vec![a.id, b.id, c.id]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, b.id);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((first.task_id, second.task_id), (a.id, c.id));
        assert_eq!(first.draft.subject, "Due: first");
    }

    #[tokio::test]
    async fn repeated_ticks_resurface_the_same_tasks() {
        let (m, s, _rx) = setup(Arc::new(PickyMailer::default()));
        m.create_from_structured("x", "a@b.com", Some(now() - ChronoDuration::minutes(1)))
            .unwrap();
        m.create_from_structured("y", "a@b.com", Some(now())).unwrap();

        let first = s.tick().await.unwrap();
        let second = s.tick().await.unwrap();
        assert_eq!(first.due.len(), 2);
        assert_eq!(first.due, second.due);
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let mailer = Arc::new(PickyMailer::default());
        let (m, s, _rx) = setup(mailer.clone());
        m.create_from_structured("slow", "a@b.com", Some(now() - ChronoDuration::minutes(1)))
            .unwrap();
        let s = Arc::new(s);

        let running = tokio::spawn({
            let s = s.clone();
            async move { s.tick().await }
        });
        mailer.entered.notified().await;

        assert!(s.tick().await.is_none());
        assert_eq!(s.skipped_ticks(), 1);

        mailer.gate.notify_one();
        let report = running.await.unwrap().unwrap();
        assert_eq!(report.drafted.len(), 1);
        assert!(!s.running.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_ticks_until_stopped() {
        let (m, s, mut rx) = setup(Arc::new(PickyMailer::default()));
        m.create_from_structured("x", "a@b.com", Some(now() - ChronoDuration::minutes(1)))
            .unwrap();

        let handle = Arc::new(s.with_interval(Duration::from_secs(60))).start();

        // First tick fires immediately, the next after one interval.
        assert!(rx.recv().await.is_some());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(rx.recv().await.is_some());

        handle.stop().await;
        assert!(rx.recv().await.is_none());
    }
}
