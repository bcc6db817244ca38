//! Gateway trait - the seam between the dispatcher and the provider

use crate::error::Result;
use crate::whatsapp_business::DeliveryResult;
use async_trait::async_trait;
use dataplug_core::Intent;

/// Outbound message delivery seam
///
/// Implemented by the WhatsApp Business adapter; test doubles implement
/// it to observe dispatched intents without network access. Inbound
/// concerns (webhook verification, allowlist filtering) stay on the
/// adapter itself.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Deliver an intent with a single plain-text fallback; never errors
    async fn send_intent(&self, phone: &str, intent: &Intent) -> DeliveryResult;

    /// Send a plain text message
    async fn send_text(&self, phone: &str, body: &str) -> Result<String>;

    /// Mark an inbound message as read (best effort)
    async fn mark_as_read(&self, message_id: &str) -> Result<()>;
}
