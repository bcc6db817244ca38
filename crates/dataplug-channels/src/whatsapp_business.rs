//! WhatsApp Business Cloud API adapter
//!
//! Maps each domain [`Intent`] to exactly one provider payload
//! (interactive buttons for plan selection and payment confirmation,
//! plain text for everything else) and delivers it with a single
//! plain-text fallback on failure. Delivery never raises past this
//! boundary; every failure becomes a [`DeliveryResult`].
//!
//! # Setup
//!
//! 1. Create a Meta Business account
//! 2. Set up WhatsApp Business API in Meta Business Suite
//! 3. Get your Access Token and Phone Number ID
//! 4. Configure the webhook for receiving messages

use crate::error::{Error, Result};
use dataplug_core::{catalog, InboundEvent, Intent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Maximum length of text to log
const MAX_LOG_TEXT_LENGTH: usize = 50;

/// Sensitive patterns to mask
const SENSITIVE_PATTERNS: &[&str] = &["password", "secret", "token", "pin", "card", "cvv"];

/// Generic body sent when the rendered message could not be delivered
const FALLBACK_BODY: &str =
    "Sorry, we couldn't send that message. Reply 'hi' to see the available plans.";

/// Default provider call timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Mask sensitive text for logging
fn mask_for_logging(text: &str) -> String {
    let lower = text.to_lowercase();
    for pattern in SENSITIVE_PATTERNS {
        if lower.contains(pattern) {
            return "[REDACTED]".to_string();
        }
    }
    // Truncate on a char boundary, not a byte offset.
    match text.char_indices().nth(MAX_LOG_TEXT_LENGTH) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// WhatsApp Business API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppBusinessConfig {
    /// Access token (from Meta Business Suite)
    pub access_token: String,
    /// Phone Number ID (the bot's phone number ID)
    pub phone_number_id: String,
    /// Webhook verify token (for webhook verification)
    pub webhook_verify_token: String,
    /// Allowed phone numbers (empty = allow all)
    #[serde(default)]
    pub allowed_numbers: Vec<String>,
    /// API version (default: v18.0)
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Provider call timeout in seconds (default: 10)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_version() -> String {
    "v18.0".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl WhatsAppBusinessConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let access_token = std::env::var("WHATSAPP_ACCESS_TOKEN")
            .map_err(|_| Error::WhatsApp("WHATSAPP_ACCESS_TOKEN not set".to_string()))?;

        let phone_number_id = std::env::var("WHATSAPP_PHONE_NUMBER_ID")
            .map_err(|_| Error::WhatsApp("WHATSAPP_PHONE_NUMBER_ID not set".to_string()))?;

        let webhook_verify_token = std::env::var("WHATSAPP_WEBHOOK_VERIFY_TOKEN")
            .unwrap_or_else(|_| "dataplug_webhook_verify".to_string());

        let allowed_numbers: Vec<String> = std::env::var("WHATSAPP_ALLOWED_NUMBERS")
            .ok()
            .map(|s| s.split(',').map(|n| n.trim().to_string()).collect())
            .unwrap_or_default();

        let api_version =
            std::env::var("WHATSAPP_API_VERSION").unwrap_or_else(|_| default_api_version());

        let timeout_secs = std::env::var("PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            access_token,
            phone_number_id,
            webhook_verify_token,
            allowed_numbers,
            api_version,
            timeout_secs,
        })
    }

    /// Create with required fields
    #[must_use]
    pub fn new(access_token: impl Into<String>, phone_number_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            phone_number_id: phone_number_id.into(),
            webhook_verify_token: "dataplug_webhook_verify".to_string(),
            allowed_numbers: Vec::new(),
            api_version: default_api_version(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set webhook verify token
    #[must_use]
    pub fn with_webhook_verify_token(mut self, token: impl Into<String>) -> Self {
        self.webhook_verify_token = token.into();
        self
    }

    /// Set allowed numbers
    #[must_use]
    pub fn with_allowed_numbers(mut self, numbers: Vec<String>) -> Self {
        self.allowed_numbers = numbers;
        self
    }

    /// Get API URL for the messages endpoint
    fn messages_url(&self) -> String {
        format!(
            "https://graph.facebook.com/{}/{}/messages",
            self.api_version, self.phone_number_id
        )
    }
}

/// WhatsApp Business API response
#[derive(Debug, Deserialize)]
#[allow(dead_code)] // All fields needed for JSON deserialization
struct ApiResponse {
    messaging_product: Option<String>,
    messages: Option<Vec<MessageInfo>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct MessageInfo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    code: i32,
}

/// Incoming webhook event from the WhatsApp Business API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppBusinessWebhook {
    /// Object type (should be "whatsapp_business_account")
    pub object: String,
    /// Entry array
    pub entry: Vec<WebhookEntry>,
}

impl WhatsAppBusinessWebhook {
    /// All user messages in the payload, across entries and changes
    ///
    /// Delivery receipts (`statuses` changes) are skipped.
    #[must_use]
    pub fn messages(&self) -> Vec<WebhookMessage> {
        self.entry
            .iter()
            .flat_map(|entry| &entry.changes)
            .filter(|change| change.field == "messages")
            .flat_map(|change| change.value.messages.iter().cloned())
            .collect()
    }
}

/// Webhook entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEntry {
    /// Business Account ID
    pub id: String,
    /// Changes array
    pub changes: Vec<WebhookChange>,
}

/// Webhook change event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChange {
    /// Value containing the actual message data
    pub value: WebhookValue,
    /// Field name
    pub field: String,
}

/// Webhook value containing message data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookValue {
    /// Messaging product
    pub messaging_product: String,
    /// Contacts (sender info)
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
    /// Messages
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
    /// Statuses (delivery receipts)
    #[serde(default)]
    pub statuses: Vec<WebhookStatus>,
}

/// Webhook contact (sender info)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookContact {
    /// Profile info
    pub profile: Option<WebhookProfile>,
    /// Phone number
    pub wa_id: String,
}

/// Webhook profile (user profile)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookProfile {
    /// Display name
    pub name: String,
}

/// Webhook message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookMessage {
    /// Sender phone number
    pub from: String,
    /// Message ID
    pub id: String,
    /// Timestamp
    pub timestamp: String,
    /// Message type
    #[serde(rename = "type")]
    pub message_type: String,
    /// Text content (for text messages)
    pub text: Option<TextContent>,
    /// Interactive content (for button replies)
    pub interactive: Option<InteractiveContent>,
}

/// Text content in a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// Message body
    pub body: String,
}

/// Interactive content in a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractiveContent {
    /// Interactive type (e.g. "button_reply")
    #[serde(rename = "type")]
    pub interactive_type: String,
    /// Button reply payload
    pub button_reply: Option<ButtonReplyContent>,
}

/// Button reply payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonReplyContent {
    /// Button id (a plan id or `confirm_yes`/`confirm_no`)
    pub id: String,
    /// Button label
    pub title: String,
}

/// Webhook status (delivery receipts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookStatus {
    /// Message ID
    pub id: String,
    /// Status (sent, delivered, read)
    pub status: String,
    /// Timestamp
    pub timestamp: String,
    /// Recipient ID
    pub recipient_id: String,
}

/// Outcome of one intent delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// The rendered payload was delivered
    Delivered {
        /// Provider message id
        message_id: String,
    },
    /// The rendered payload failed; the generic text fallback went out
    FallbackDelivered {
        /// Provider message id of the fallback
        message_id: String,
    },
    /// Both the rendered payload and the fallback failed
    Failed {
        /// Combined failure description for the error log
        reason: String,
    },
}

/// WhatsApp Business API adapter
pub struct WhatsAppBusinessAdapter {
    config: WhatsAppBusinessConfig,
    client: reqwest::Client,
}

impl WhatsAppBusinessAdapter {
    /// Create a new WhatsApp Business adapter
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: WhatsAppBusinessConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::WhatsApp(format!("failed to create HTTP client: {e}")))?;

        info!(
            phone_number_id = %config.phone_number_id,
            timeout_secs = config.timeout_secs,
            "WhatsApp Business API adapter initialized"
        );

        Ok(Self { config, client })
    }

    /// Create from environment
    pub fn from_env() -> Result<Self> {
        let config = WhatsAppBusinessConfig::from_env()?;
        Self::new(config)
    }

    /// Verify webhook (for initial webhook setup)
    pub fn verify_webhook(&self, mode: &str, token: &str, challenge: &str) -> Option<String> {
        if mode == "subscribe" && token == self.config.webhook_verify_token {
            info!("WhatsApp webhook verified");
            Some(challenge.to_string())
        } else {
            None
        }
    }

    /// Check if a phone number is allowed
    pub fn is_number_allowed(&self, number: &str) -> bool {
        if self.config.allowed_numbers.is_empty() {
            return true;
        }
        let normalized = number.replace(['+', '-', ' '], "");
        self.config.allowed_numbers.iter().any(|allowed| {
            let norm_allowed = allowed.replace(['+', '-', ' '], "");
            normalized.contains(&norm_allowed) || norm_allowed.contains(&normalized)
        })
    }

    /// Extract user messages from a webhook payload
    ///
    /// Filters out delivery receipts and messages from numbers outside
    /// the allowlist.
    pub fn extract_messages(&self, webhook: &WhatsAppBusinessWebhook) -> Vec<WebhookMessage> {
        webhook
            .messages()
            .into_iter()
            .filter(|msg| {
                let allowed = self.is_number_allowed(&msg.from);
                if !allowed {
                    debug!(from = %msg.from, "number not allowed");
                }
                allowed
            })
            .collect()
    }

    /// Parse one webhook message into a domain event
    ///
    /// This is the single boundary where provider shape uncertainty is
    /// resolved; anything unexpected becomes `MalformedInboundEvent`.
    pub fn parse_inbound(msg: &WebhookMessage) -> dataplug_core::Result<InboundEvent> {
        match msg.message_type.as_str() {
            "text" => {
                let body = msg
                    .text
                    .as_ref()
                    .map(|t| t.body.clone())
                    .unwrap_or_default();
                if body.is_empty() {
                    return Err(dataplug_core::Error::MalformedInboundEvent(
                        "text message without a body".to_string(),
                    ));
                }
                Ok(InboundEvent::Text { body })
            }
            "interactive" => {
                let reply = msg
                    .interactive
                    .as_ref()
                    .and_then(|i| i.button_reply.as_ref())
                    .ok_or_else(|| {
                        dataplug_core::Error::MalformedInboundEvent(
                            "interactive message without a button reply".to_string(),
                        )
                    })?;
                Ok(InboundEvent::ButtonReply {
                    id: reply.id.clone(),
                    title: reply.title.clone(),
                })
            }
            other => Err(dataplug_core::Error::MalformedInboundEvent(format!(
                "unsupported message type: {other}"
            ))),
        }
    }

    /// Render an intent into the provider request body
    fn payload_for_intent(&self, to: &str, intent: &Intent) -> serde_json::Value {
        match intent {
            Intent::ShowAvailablePlans => {
                let buttons: Vec<serde_json::Value> = catalog::all()
                    .iter()
                    .map(|plan| {
                        json!({
                            "type": "reply",
                            "reply": {
                                "id": plan.id,
                                "title": format!("{} — ₦{}", plan.title, plan.price),
                            }
                        })
                    })
                    .collect();
                json!({
                    "messaging_product": "whatsapp",
                    "to": to,
                    "type": "interactive",
                    "interactive": {
                        "type": "button",
                        "body": { "text": "Hi! Pick a data plan:" },
                        "action": { "buttons": buttons },
                    }
                })
            }
            Intent::AskPaymentConfirmation { plan_id } => match catalog::find(plan_id) {
                Some(plan) => json!({
                    "messaging_product": "whatsapp",
                    "to": to,
                    "type": "interactive",
                    "interactive": {
                        "type": "button",
                        "body": {
                            "text": format!(
                                "You picked {} ({}) for ₦{}. Proceed with payment?",
                                plan.title, plan.network, plan.price
                            )
                        },
                        "action": {
                            "buttons": [
                                { "type": "reply", "reply": { "id": "confirm_yes", "title": "Yes, pay" } },
                                { "type": "reply", "reply": { "id": "confirm_no", "title": "No, go back" } },
                            ]
                        },
                    }
                }),
                // Should not happen: the engine only stores catalog ids.
                None => Self::text_payload(to, "Sorry, something went wrong. Please try again."),
            },
            Intent::InitiatePurchase { .. } => {
                Self::text_payload(to, "We're processing your payment request.")
            }
            Intent::PaymentStillProcessing => Self::text_payload(
                to,
                "Your payment is still processing. We'll confirm as soon as it completes.",
            ),
            Intent::ReportError => {
                Self::text_payload(to, "Sorry, something went wrong. Please try again.")
            }
        }
    }

    fn text_payload(to: &str, body: &str) -> serde_json::Value {
        json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": body },
        })
    }

    /// Deliver an intent, falling back once to plain text
    ///
    /// Never returns an error: all failures collapse into
    /// [`DeliveryResult::Failed`] for the caller to log.
    #[instrument(skip(self, intent), fields(to = %phone))]
    pub async fn send_intent(&self, phone: &str, intent: &Intent) -> DeliveryResult {
        let payload = self.payload_for_intent(phone, intent);

        match self.post_payload(&payload).await {
            Ok(message_id) => DeliveryResult::Delivered { message_id },
            Err(e) => {
                warn!(error = %e, "intent delivery failed, sending text fallback");
                match self.send_text(phone, FALLBACK_BODY).await {
                    Ok(message_id) => DeliveryResult::FallbackDelivered { message_id },
                    Err(fallback_err) => {
                        error!(error = %fallback_err, "fallback delivery failed");
                        DeliveryResult::Failed {
                            reason: format!("{e}; fallback: {fallback_err}"),
                        }
                    }
                }
            }
        }
    }

    /// Send a plain text message
    pub async fn send_text(&self, phone: &str, body: &str) -> Result<String> {
        debug!(to = %phone, body = %mask_for_logging(body), "sending text message");
        self.post_payload(&Self::text_payload(phone, body)).await
    }

    /// POST a request body to the messages endpoint
    async fn post_payload(&self, payload: &serde_json::Value) -> Result<String> {
        let resp: ApiResponse = self
            .client
            .post(self.config.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Network(format!("failed to send message: {e}")))?
            .json()
            .await
            .map_err(|e| Error::WhatsApp(format!("invalid API response: {e}")))?;

        if let Some(api_error) = resp.error {
            return Err(Error::WhatsApp(format!(
                "API error {}: {}",
                api_error.code, api_error.message
            )));
        }

        Ok(resp
            .messages
            .and_then(|m| m.first().map(|msg| msg.id.clone()))
            .unwrap_or_default())
    }

    /// Mark a message as read (best effort)
    pub async fn mark_as_read(&self, message_id: &str) -> Result<()> {
        #[derive(Serialize)]
        struct ReadRequest<'a> {
            messaging_product: &'static str,
            status: &'static str,
            message_id: &'a str,
        }

        self.client
            .post(self.config.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(&ReadRequest {
                messaging_product: "whatsapp",
                status: "read",
                message_id,
            })
            .send()
            .await
            .map_err(|e| Error::Network(format!("failed to mark as read: {e}")))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl crate::gateway::MessageGateway for WhatsAppBusinessAdapter {
    async fn send_intent(&self, phone: &str, intent: &Intent) -> DeliveryResult {
        WhatsAppBusinessAdapter::send_intent(self, phone, intent).await
    }

    async fn send_text(&self, phone: &str, body: &str) -> Result<String> {
        WhatsAppBusinessAdapter::send_text(self, phone, body).await
    }

    async fn mark_as_read(&self, message_id: &str) -> Result<()> {
        WhatsAppBusinessAdapter::mark_as_read(self, message_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> WhatsAppBusinessAdapter {
        WhatsAppBusinessAdapter::new(WhatsAppBusinessConfig::new("token", "phone_id")).unwrap()
    }

    fn text_message(from: &str, body: &str) -> WebhookMessage {
        WebhookMessage {
            from: from.to_string(),
            id: "wamid.test".to_string(),
            timestamp: "1700000000".to_string(),
            message_type: "text".to_string(),
            text: Some(TextContent {
                body: body.to_string(),
            }),
            interactive: None,
        }
    }

    #[test]
    fn test_config() {
        let config = WhatsAppBusinessConfig::new("token", "phone_id")
            .with_webhook_verify_token("my_token")
            .with_allowed_numbers(vec!["+2347063255405".to_string()]);

        assert_eq!(config.access_token, "token");
        assert_eq!(config.phone_number_id, "phone_id");
        assert_eq!(config.webhook_verify_token, "my_token");
        assert_eq!(config.allowed_numbers.len(), 1);
        assert_eq!(config.timeout_secs, 10);
    }

    #[test]
    fn test_verify_webhook() {
        let config =
            WhatsAppBusinessConfig::new("token", "phone_id").with_webhook_verify_token("verify");
        let adapter = WhatsAppBusinessAdapter::new(config).unwrap();

        assert_eq!(
            adapter.verify_webhook("subscribe", "verify", "challenge_123"),
            Some("challenge_123".to_string())
        );
        assert_eq!(adapter.verify_webhook("subscribe", "wrong", "challenge_123"), None);
        assert_eq!(adapter.verify_webhook("unsubscribe", "verify", "challenge_123"), None);
    }

    #[test]
    fn test_number_allowed() {
        let config = WhatsAppBusinessConfig::new("token", "phone_id")
            .with_allowed_numbers(vec!["+2347063255405".to_string()]);
        let adapter = WhatsAppBusinessAdapter::new(config).unwrap();

        assert!(adapter.is_number_allowed("+2347063255405"));
        assert!(adapter.is_number_allowed("2347063255405"));
        assert!(!adapter.is_number_allowed("+2349999999999"));
    }

    #[test]
    fn test_empty_allowlist_allows_all() {
        let adapter = adapter();
        assert!(adapter.is_number_allowed("+2347063255405"));
        assert!(adapter.is_number_allowed("+14155551234"));
    }

    #[test]
    fn test_parse_inbound_text() {
        let event =
            WhatsAppBusinessAdapter::parse_inbound(&text_message("2347063255405", "hi")).unwrap();
        assert_eq!(event, InboundEvent::text("hi"));
    }

    #[test]
    fn test_parse_inbound_button_reply() {
        let msg = WebhookMessage {
            message_type: "interactive".to_string(),
            text: None,
            interactive: Some(InteractiveContent {
                interactive_type: "button_reply".to_string(),
                button_reply: Some(ButtonReplyContent {
                    id: "1gb_379".to_string(),
                    title: "1GB — ₦379".to_string(),
                }),
            }),
            ..text_message("2347063255405", "")
        };
        let event = WhatsAppBusinessAdapter::parse_inbound(&msg).unwrap();
        assert_eq!(event, InboundEvent::button_reply("1gb_379", "1GB — ₦379"));
    }

    #[test]
    fn test_parse_inbound_rejects_unsupported_type() {
        let msg = WebhookMessage {
            message_type: "sticker".to_string(),
            text: None,
            ..text_message("2347063255405", "")
        };
        let err = WhatsAppBusinessAdapter::parse_inbound(&msg).unwrap_err();
        assert!(matches!(
            err,
            dataplug_core::Error::MalformedInboundEvent(_)
        ));
    }

    #[test]
    fn test_parse_inbound_rejects_empty_text() {
        let err =
            WhatsAppBusinessAdapter::parse_inbound(&text_message("234111", "")).unwrap_err();
        assert!(matches!(
            err,
            dataplug_core::Error::MalformedInboundEvent(_)
        ));
    }

    #[test]
    fn test_show_plans_renders_catalog_buttons() {
        let adapter = adapter();
        let payload = adapter.payload_for_intent("2347063255405", &Intent::ShowAvailablePlans);

        assert_eq!(payload["type"], "interactive");
        assert_eq!(payload["to"], "2347063255405");
        let buttons = payload["interactive"]["action"]["buttons"]
            .as_array()
            .unwrap();
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0]["reply"]["id"], "500mb_299");
        assert_eq!(buttons[1]["reply"]["id"], "1gb_379");
    }

    #[test]
    fn test_confirmation_renders_catalog_price() {
        let adapter = adapter();
        let payload = adapter.payload_for_intent(
            "2347063255405",
            &Intent::AskPaymentConfirmation {
                plan_id: "1gb_379".to_string(),
            },
        );

        assert_eq!(payload["type"], "interactive");
        let body = payload["interactive"]["body"]["text"].as_str().unwrap();
        assert!(body.contains("1GB"));
        assert!(body.contains("379"));
        let buttons = payload["interactive"]["action"]["buttons"]
            .as_array()
            .unwrap();
        assert_eq!(buttons[0]["reply"]["id"], "confirm_yes");
        assert_eq!(buttons[1]["reply"]["id"], "confirm_no");
    }

    #[test]
    fn test_plain_text_intents_render_as_text() {
        let adapter = adapter();
        for intent in [Intent::PaymentStillProcessing, Intent::ReportError] {
            let payload = adapter.payload_for_intent("234111", &intent);
            assert_eq!(payload["type"], "text");
            assert!(!payload["text"]["body"].as_str().unwrap().is_empty());
        }
    }

    #[test]
    fn test_extract_messages_skips_receipts_and_blocked_numbers() {
        let config = WhatsAppBusinessConfig::new("token", "phone_id")
            .with_allowed_numbers(vec!["2347063255405".to_string()]);
        let adapter = WhatsAppBusinessAdapter::new(config).unwrap();

        let webhook = WhatsAppBusinessWebhook {
            object: "whatsapp_business_account".to_string(),
            entry: vec![WebhookEntry {
                id: "waba_id".to_string(),
                changes: vec![
                    WebhookChange {
                        field: "messages".to_string(),
                        value: WebhookValue {
                            messaging_product: "whatsapp".to_string(),
                            contacts: vec![],
                            messages: vec![
                                text_message("2347063255405", "hi"),
                                text_message("2349999999999", "blocked"),
                            ],
                            statuses: vec![],
                        },
                    },
                    WebhookChange {
                        field: "statuses".to_string(),
                        value: WebhookValue {
                            messaging_product: "whatsapp".to_string(),
                            contacts: vec![],
                            messages: vec![text_message("2347063255405", "not a message field")],
                            statuses: vec![],
                        },
                    },
                ],
            }],
        };

        let messages = adapter.extract_messages(&webhook);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].from, "2347063255405");
    }

    #[test]
    fn test_webhook_deserializes_from_provider_json() {
        let raw = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "1234567890",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": {
                            "display_phone_number": "15550001111",
                            "phone_number_id": "phone_id"
                        },
                        "contacts": [{
                            "profile": { "name": "Ada" },
                            "wa_id": "2347063255405"
                        }],
                        "messages": [{
                            "from": "2347063255405",
                            "id": "wamid.abc",
                            "timestamp": "1700000000",
                            "type": "interactive",
                            "interactive": {
                                "type": "button_reply",
                                "button_reply": { "id": "500mb_299", "title": "500MB — ₦299" }
                            }
                        }]
                    }
                }]
            }]
        });

        let webhook: WhatsAppBusinessWebhook = serde_json::from_value(raw).unwrap();
        let messages = adapter().extract_messages(&webhook);
        assert_eq!(messages.len(), 1);
        let event = WhatsAppBusinessAdapter::parse_inbound(&messages[0]).unwrap();
        assert_eq!(event, InboundEvent::button_reply("500mb_299", "500MB — ₦299"));
    }

    #[test]
    fn test_mask_for_logging() {
        assert_eq!(mask_for_logging("my card pin is 1234"), "[REDACTED]");
        assert_eq!(mask_for_logging("hi"), "hi");
        let long = "a".repeat(80);
        assert!(mask_for_logging(&long).ends_with("..."));
    }

    #[test]
    fn test_mask_for_logging_truncates_multibyte_text() {
        let long = "₦".repeat(80);
        let masked = mask_for_logging(&long);
        assert!(masked.ends_with("..."));
        assert_eq!(masked.chars().filter(|c| *c == '₦').count(), 50);
    }
}
