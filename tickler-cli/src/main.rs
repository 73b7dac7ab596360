use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod interpreter;
mod llm;
mod mailer;
mod sqlite_store;
mod state;
mod tasks_cmd;

#[derive(Parser, Debug)]
#[command(
    name = "tickler",
    version,
    about = "Email reminder tasks: capture, schedule, draft, confirm, send"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage ~/.tickler/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Store API keys and the SMTP password in ~/.tickler/auth.json
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },

    /// Create a task from explicit fields
    Add {
        #[arg(long)]
        description: String,

        /// Recipient email address
        #[arg(long)]
        to: String,

        /// Due expression, e.g. "tomorrow at 3pm" or "2026-03-05 17:00"
        #[arg(long)]
        due: Option<String>,
    },

    /// Create a task from a free-text reminder (uses the configured model)
    Remind {
        text: String,

        /// Overrides any time mentioned in the text
        #[arg(long)]
        due: Option<String>,
    },

    /// List all tasks
    List {
        /// Print tasks as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Show one task
    Show { id: String },

    /// Task counts by status, plus overdue
    Stats,

    /// Print the email that would be sent for a task
    Draft { id: String },

    /// Send a task's email and mark it sent
    Send {
        id: String,

        /// Use this subject instead of a drafted one (requires --body)
        #[arg(long)]
        subject: Option<String>,

        /// Use this body instead of a drafted one (requires --subject)
        #[arg(long)]
        body: Option<String>,
    },

    /// Scan once for due tasks and print their drafts
    Due,

    /// Run the due-task scheduler until Ctrl-C
    Serve,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config if none exists
    Init,
    /// Print the effective config
    Show,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    PasteOpenaiKey,
    PasteAnthropicKey,
    PasteSmtpPassword,
}

fn init_tracing() {
    let filter = std::env::var("TICKLER_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("tickler=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => config::show_config()?,
        },

        Command::Auth { command } => match command {
            AuthCommand::PasteOpenaiKey => auth::openai_paste_api_key()?,
            AuthCommand::PasteAnthropicKey => auth::anthropic_paste_api_key()?,
            AuthCommand::PasteSmtpPassword => auth::smtp_paste_password()?,
        },

        Command::Add {
            description,
            to,
            due,
        } => tasks_cmd::add(&description, &to, due.as_deref())?,
        Command::Remind { text, due } => tasks_cmd::remind(&text, due.as_deref()).await?,
        Command::List { json } => tasks_cmd::list(json)?,
        Command::Show { id } => tasks_cmd::show(&id)?,
        Command::Stats => tasks_cmd::stats()?,
        Command::Draft { id } => tasks_cmd::draft(&id).await?,
        Command::Send { id, subject, body } => tasks_cmd::send(&id, subject, body).await?,
        Command::Due => tasks_cmd::due().await?,
        Command::Serve => tasks_cmd::serve().await?,
    }

    Ok(())
}
