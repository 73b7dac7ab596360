use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tickler_core::DueDateResolver;

use crate::state::{default_db_path, ensure_tickler_home};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmSection,
    pub mail: MailSection,
    pub scheduler: SchedulerSection,
    pub time: TimeSection,
    pub store: StoreSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// "openai" or "anthropic"
    pub provider: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSection {
    /// From address on every reminder email.
    pub sender_email: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Defaults to `sender_email` when unset.
    pub smtp_username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSection {
    /// IANA timezone used to read and render wall-clock times.
    pub timezone: String,
    /// Hour of day for date-only due expressions ("tomorrow").
    pub default_hour: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// SQLite file; defaults to ~/.tickler/tasks.db
    pub path: Option<PathBuf>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
        }
    }
}

impl Default for MailSection {
    fn default() -> Self {
        Self {
            sender_email: String::new(),
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            smtp_username: None,
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl Default for TimeSection {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            default_hour: 9,
        }
    }
}

impl Config {
    pub fn resolver(&self) -> Result<DueDateResolver> {
        Ok(DueDateResolver::from_timezone_name(&self.time.timezone)?
            .with_default_hour(self.time.default_hour))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.interval_secs.max(1))
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.store.path {
            Some(p) => Ok(p.clone()),
            None => default_db_path(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_tickler_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    println!("Set [mail].sender_email before sending reminders.");
    Ok(())
}

pub fn show_config() -> Result<()> {
    let cfg = load_config()?;
    println!("# {}", config_path()?.display());
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(())
}
