use async_trait::async_trait;
use lettre::message::{Mailbox, Message, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tickler_core::{DeliveryReceipt, EmailDraft, Mailer, OutgoingEmail, TaskError, parse_draft};
use tracing::debug;

use crate::config::MailSection;
use crate::llm::LlmClient;

const DRAFT_PROMPT: &str = "You write short, friendly reminder emails.\n\
Reply in exactly this format and nothing else:\n\
Subject: <one-line subject>\n\
\n\
<email body, plain text, signed off without a name>";

/// Drafts with a language model and delivers over authenticated SMTP.
pub struct SmtpMailer {
    llm: Option<LlmClient>,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpMailer {
    /// Transport is only built when a password is available; drafting works without it.
    pub fn new(
        mail: &MailSection,
        smtp_password: Option<String>,
        llm: Option<LlmClient>,
    ) -> anyhow::Result<Self> {
        let transport = match smtp_password {
            Some(password) => {
                let username = mail
                    .smtp_username
                    .clone()
                    .unwrap_or_else(|| mail.sender_email.clone());
                let builder = if mail.smtp_port == 465 {
                    AsyncSmtpTransport::<Tokio1Executor>::relay(&mail.smtp_host)?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&mail.smtp_host)?
                };
                Some(
                    builder
                        .port(mail.smtp_port)
                        .credentials(Credentials::new(username, password))
                        .build(),
                )
            }
            None => None,
        };
        Ok(Self { llm, transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn draft(
        &self,
        description: &str,
        recipient_email: &str,
        due_rendering: &str,
    ) -> tickler_core::Result<EmailDraft> {
        let llm = self.llm.as_ref().ok_or_else(|| {
            TaskError::DraftGeneration("no language model configured for drafting".to_string())
        })?;

        let user = format!(
            "Task: {description}\nRecipient: {recipient_email}\nDue: {due_rendering}"
        );
        let raw = llm
            .complete(DRAFT_PROMPT, &user)
            .await
            .map_err(|e| TaskError::DraftGeneration(format!("{e:#}")))?;
        debug!(%raw, "draft output");

        parse_draft(&raw)
    }

    async fn send(&self, email: &OutgoingEmail) -> tickler_core::Result<DeliveryReceipt> {
        let transport = self.transport.as_ref().ok_or_else(|| {
            TaskError::Delivery(
                "SMTP is not configured; run: tickler auth paste-smtp-password".to_string(),
            )
        })?;

        let message = build_message(email)?;
        let response = transport
            .send(message)
            .await
            .map_err(|e| TaskError::Delivery(e.to_string()))?;

        Ok(DeliveryReceipt {
            provider_id: response.message().next().map(str::to_string),
        })
    }
}

fn build_message(email: &OutgoingEmail) -> tickler_core::Result<Message> {
    let from: Mailbox = email
        .from
        .parse()
        .map_err(|e| TaskError::Delivery(format!("invalid sender '{}': {e}", email.from)))?;
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| TaskError::InvalidRecipient {
            email: format!("{} ({e})", email.to),
        })?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| TaskError::Delivery(format!("failed to build message: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outgoing(to: &str) -> OutgoingEmail {
        OutgoingEmail {
            to: to.to_string(),
            from: "me@example.com".to_string(),
            subject: "Lunch".to_string(),
            body: "Noon works.".to_string(),
        }
    }

    #[test]
    fn builds_plain_text_message() {
        let msg = build_message(&outgoing("bob@x.com")).unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("To: bob@x.com"));
        assert!(raw.contains("Subject: Lunch"));
        assert!(raw.contains("Noon works."));
    }

    #[test]
    fn unparsable_recipient_is_rejected() {
        assert!(build_message(&outgoing("not an address")).is_err());
    }

    #[tokio::test]
    async fn send_without_transport_is_a_delivery_error() {
        let mailer = SmtpMailer::new(&MailSection::default(), None, None).unwrap();
        let err = mailer.send(&outgoing("bob@x.com")).await.unwrap_err();
        assert_eq!(err.kind(), "delivery");
    }

    #[tokio::test]
    async fn draft_without_llm_is_a_draft_error() {
        let mailer = SmtpMailer::new(&MailSection::default(), None, None).unwrap();
        let err = mailer.draft("x", "a@b.com", "no due date").await.unwrap_err();
        assert_eq!(err.kind(), "draft_generation");
    }
}
