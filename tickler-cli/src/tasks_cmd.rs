use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use tickler_core::{
    DueDateResolver, ReminderService, Task, TaskError, TaskId, TaskManager, TickReport,
};
use tracing::{info, warn};

use crate::auth::load_auth;
use crate::config::{Config, load_config};
use crate::interpreter::LlmInterpreter;
use crate::llm::LlmClient;
use crate::mailer::SmtpMailer;
use crate::sqlite_store::SqliteTaskStore;

/// Wire config, stored secrets and adapters into a manager.
pub fn build_manager(cfg: &Config) -> Result<TaskManager> {
    let auth = load_auth()?;
    let resolver = cfg.resolver()?;
    let llm = LlmClient::from_config(&cfg.llm, &auth)?;

    let db = cfg.db_path()?;
    let store = SqliteTaskStore::open(&db).with_context(|| format!("open {}", db.display()))?;
    let interpreter = LlmInterpreter::new(llm.clone(), resolver.timezone());
    let mailer = SmtpMailer::new(&cfg.mail, auth.smtp_password.clone(), llm)?;

    Ok(TaskManager::new(
        Arc::new(store),
        Arc::new(interpreter),
        Arc::new(mailer),
        cfg.mail.sender_email.clone(),
    )
    .with_resolver(resolver))
}

fn manager() -> Result<TaskManager> {
    build_manager(&load_config()?)
}

fn parse_id(id: &str) -> Result<TaskId> {
    id.parse().with_context(|| format!("invalid task id '{id}'"))
}

fn resolve_opt(m: &TaskManager, due: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    due.map(|d| m.resolve_due(d)).transpose().map_err(Into::into)
}

fn print_task(t: &Task, resolver: &DueDateResolver) {
    println!(
        "#{:<4} [{}] {} -> {} | due: {}",
        t.id.0,
        t.status,
        t.description,
        t.recipient_email,
        resolver.render(t.due_at)
    );
}

pub fn add(description: &str, to: &str, due: Option<&str>) -> Result<()> {
    let m = manager()?;
    let due_at = resolve_opt(&m, due)?;
    let task = m.create_from_structured(description, to, due_at)?;
    println!("Created task #{}", task.id.0);
    print_task(&task, m.resolver());
    Ok(())
}

pub async fn remind(text: &str, due: Option<&str>) -> Result<()> {
    let m = manager()?;
    let due_at = resolve_opt(&m, due)?;
    let task = m.create_from_reminder_text(text, due_at).await?;
    println!("Created task #{}", task.id.0);
    print_task(&task, m.resolver());
    Ok(())
}

pub fn list(json: bool) -> Result<()> {
    let m = manager()?;
    let tasks = m.list_tasks()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tasks).context("serialize tasks")?);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    for t in &tasks {
        print_task(t, m.resolver());
    }
    Ok(())
}

pub fn show(id: &str) -> Result<()> {
    let m = manager()?;
    let t = m.get_task(parse_id(id)?)?;
    let r = m.resolver();
    println!("Task #{}", t.id.0);
    println!("  description: {}", t.description);
    println!("  recipient:   {}", t.recipient_email);
    println!("  due:         {}", r.render(t.due_at));
    println!("  status:      {}", t.status);
    println!("  created:     {}", r.render(Some(t.created_at)));
    if let Some(sent) = t.sent_at {
        println!("  sent:        {}", r.render(Some(sent)));
    }
    Ok(())
}

pub fn stats() -> Result<()> {
    let a = manager()?.analytics()?;
    println!("total:   {}", a.total);
    println!("pending: {}", a.pending);
    println!("sent:    {}", a.sent);
    println!("overdue: {}", a.overdue);
    Ok(())
}

pub async fn draft(id: &str) -> Result<()> {
    let m = manager()?;
    let task = m.get_task(parse_id(id)?)?;
    let draft = m.draft_email(&task).await?;
    println!("To: {}", task.recipient_email);
    println!("Subject: {}\n", draft.subject);
    println!("{}", draft.body);
    Ok(())
}

pub async fn send(id: &str, subject: Option<String>, body: Option<String>) -> Result<()> {
    if subject.is_some() != body.is_some() {
        bail!("--subject and --body must be given together");
    }
    let m = manager()?;
    let id = parse_id(id)?;
    match m.confirm_and_send(id, subject, body).await {
        Ok(done) => {
            println!("Sent task #{} to {}", done.task.id.0, done.task.recipient_email);
            println!("Subject: {}", done.subject);
            if let Some(pid) = done.provider_id {
                println!("Provider id: {pid}");
            }
            Ok(())
        }
        Err(e @ TaskError::Delivery(_)) => {
            bail!("{e}\nTask #{} is still pending; retry with: tickler send {}", id.0, id.0)
        }
        Err(e) => Err(e.into()),
    }
}

/// One scan: draft every due task and print the drafts.
pub async fn due() -> Result<()> {
    let cfg = load_config()?;
    let (service, _events) = ReminderService::new(build_manager(&cfg)?, cfg.tick_interval());
    let Some(report) = service.scheduler().tick().await else {
        bail!("a scan is already running");
    };
    print_report(&report, service.manager().resolver());
    Ok(())
}

fn print_report(report: &TickReport, resolver: &DueDateResolver) {
    if let Some(e) = &report.scan_error {
        println!("Scan failed: {e}");
        return;
    }
    if report.due.is_empty() {
        println!("Nothing due.");
        return;
    }
    for d in &report.drafted {
        println!(
            "#{} due {} -> {}",
            d.task_id.0,
            resolver.render(Some(d.due_at)),
            d.recipient_email
        );
        println!("  Subject: {}", d.draft.subject);
        for line in d.draft.body.lines() {
            println!("  | {line}");
        }
        println!("  confirm with: tickler send {}", d.task_id.0);
    }
    for (id, e) in &report.failures {
        println!("#{} could not be drafted: {e}", id.0);
    }
}

/// Run the scheduler until Ctrl-C, logging each due task as it is drafted.
pub async fn serve() -> Result<()> {
    let cfg = load_config()?;
    let (mut service, mut events) =
        ReminderService::new(build_manager(&cfg)?, cfg.tick_interval());
    service.start();
    info!(interval_secs = cfg.tick_interval().as_secs(), "reminder service started");

    loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Some(due) => info!(
                    task_id = %due.task_id,
                    recipient = %due.recipient_email,
                    subject = %due.draft.subject,
                    "task due; awaiting confirmation"
                ),
                None => {
                    warn!("scheduler event channel closed");
                    break;
                }
            },
            res = tokio::signal::ctrl_c() => {
                res.context("listen for ctrl-c")?;
                info!("shutdown requested");
                break;
            }
        }
    }

    service.stop().await;
    info!("reminder service stopped");
    Ok(())
}
