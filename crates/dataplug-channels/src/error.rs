//! Error types for dataplug-channels

use thiserror::Error;

/// Channel error type
#[derive(Debug, Error)]
pub enum Error {
    /// WhatsApp Business API error
    #[error("whatsapp error: {0}")]
    WhatsApp(String),

    /// Message parsing error
    #[error("message parsing error: {0}")]
    Parse(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
