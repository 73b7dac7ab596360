//! Reminder interpreter contract: free text in, structured task draft out.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Result, TaskError};

/// What the interpreter said about the due date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueHint {
    /// No deadline mentioned.
    None,
    /// The interpreter could not decide; the caller must clarify.
    Ambiguous,
    /// An expression for the date resolver ("tomorrow", "2026-03-05 17:00").
    Expression(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub description: String,
    /// `None` when the interpreter reported "none".
    pub recipient_email: Option<String>,
    pub due: DueHint,
}

impl Interpretation {
    /// Normalize raw contract fields (`"none"`, `"ambiguous"` sentinels).
    pub fn from_fields(description: &str, recipient_email: &str, due_date: &str) -> Self {
        let recipient_email = match recipient_email.trim() {
            r if r.is_empty() || r.eq_ignore_ascii_case("none") => None,
            r => Some(r.to_string()),
        };
        let due = match due_date.trim() {
            d if d.is_empty() || d.eq_ignore_ascii_case("none") => DueHint::None,
            d if d.eq_ignore_ascii_case("ambiguous") => DueHint::Ambiguous,
            d => DueHint::Expression(d.to_string()),
        };
        Self {
            description: description.trim().to_string(),
            recipient_email,
            due,
        }
    }
}

#[async_trait]
pub trait ReminderInterpreter: Send + Sync {
    async fn interpret(&self, text: &str) -> Result<Interpretation>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInterpretation {
    description: String,
    #[serde(alias = "recipientEmail")]
    recipient_email: String,
    #[serde(alias = "dueDate")]
    due_date: String,
}

/// Strictly parse model output: one JSON object with exactly `description`,
/// `recipient_email` and `due_date` string fields. A single surrounding
/// markdown code fence is tolerated; everything else fails closed.
pub fn parse_interpretation(raw: &str) -> Result<Interpretation> {
    let body = strip_code_fence(raw.trim());
    let parsed: RawInterpretation = serde_json::from_str(body)
        .map_err(|e| TaskError::Interpreter(format!("unparsable interpreter output: {e}")))?;
    Ok(Interpretation::from_fields(
        &parsed.description,
        &parsed.recipient_email,
        &parsed.due_date,
    ))
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
