use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// `$TICKLER_HOME`, or `~/.tickler`.
pub fn tickler_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TICKLER_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".tickler"))
}

pub fn ensure_tickler_home() -> Result<PathBuf> {
    let dir = tickler_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn default_db_path() -> Result<PathBuf> {
    Ok(ensure_tickler_home()?.join("tasks.db"))
}
