use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use tickler_core::{Interpretation, ReminderInterpreter, TaskError, parse_interpretation};
use tracing::debug;

use crate::llm::LlmClient;

const SYSTEM_PROMPT: &str = "You turn a short reminder into a task for an email assistant.\n\
Reply with ONLY a JSON object with exactly these string fields:\n\
  \"description\": what must be done, a short phrase\n\
  \"recipient_email\": the email address to write to, or \"none\" if no address is given\n\
  \"due_date\": when, as one of: \"YYYY-MM-DD HH:MM\", \"YYYY-MM-DD\", \"today\", \"tonight\", \
\"tomorrow\", \"next week\", a weekday such as \"next friday\", \"in N hours\", \"in N days\", \
optionally followed by \" at H:MMam\"; or \"none\" if no time is mentioned; \
or \"ambiguous\" if a time is mentioned but cannot be pinned down.\n\
Never guess an email address or a date. No prose, no markdown.";

/// Reminder interpreter backed by a chat-completion model.
pub struct LlmInterpreter {
    client: Option<LlmClient>,
    timezone: Tz,
}

impl LlmInterpreter {
    pub fn new(client: Option<LlmClient>, timezone: Tz) -> Self {
        Self { client, timezone }
    }
}

#[async_trait]
impl ReminderInterpreter for LlmInterpreter {
    async fn interpret(&self, text: &str) -> tickler_core::Result<Interpretation> {
        let client = self.client.as_ref().ok_or_else(|| {
            TaskError::Interpreter(
                "no language model configured; run: tickler auth paste-openai-key".to_string(),
            )
        })?;

        let today = Utc::now().with_timezone(&self.timezone);
        let user = format!(
            "Today is {} ({}).\nReminder: {}",
            today.format("%A %Y-%m-%d %H:%M"),
            self.timezone,
            text.trim()
        );

        let raw = client
            .complete(SYSTEM_PROMPT, &user)
            .await
            .map_err(|e| TaskError::Interpreter(format!("{e:#}")))?;
        debug!(%raw, "interpreter output");

        parse_interpretation(&raw)
    }
}
