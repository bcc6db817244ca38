//! Dataplug Channels - WhatsApp Business Cloud API adapter
//!
//! This crate owns everything provider-specific: webhook payload shapes,
//! webhook verification, parsing inbound messages into domain events,
//! rendering domain intents into provider payloads, and delivery with a
//! single plain-text fallback.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod gateway;
pub mod whatsapp_business;

pub use error::{Error, Result};
pub use gateway::MessageGateway;
pub use whatsapp_business::{
    DeliveryResult, WebhookMessage, WhatsAppBusinessAdapter, WhatsAppBusinessConfig,
    WhatsAppBusinessWebhook,
};
