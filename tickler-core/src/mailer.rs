//! Mailer contract: drafting and delivery.

use async_trait::async_trait;

use crate::email::{EmailDraft, OutgoingEmail};
use crate::error::Result;

/// Provider acknowledgement for a delivered message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider message id or server response, when the transport reports one.
    pub provider_id: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Produce a subject and body. Fails with `DraftGeneration` when the
    /// capability cannot produce both.
    async fn draft(
        &self,
        description: &str,
        recipient_email: &str,
        due_rendering: &str,
    ) -> Result<EmailDraft>;

    /// Deliver once. Fails with `Delivery`; never retries internally.
    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt>;
}
