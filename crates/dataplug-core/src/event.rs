//! Inbound events - the normalized form of user replies
//!
//! All shape uncertainty of the provider webhook is pushed to the channel
//! boundary; by the time the engine sees a reply it is one of these
//! variants.

use serde::{Deserialize, Serialize};

/// A parsed inbound user event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InboundEvent {
    /// Plain text reply
    Text {
        /// Message body as typed by the user
        body: String,
    },
    /// Reply produced by tapping an interactive button
    ButtonReply {
        /// Button id (e.g. a plan id or `confirm_yes`)
        id: String,
        /// Button label shown to the user
        title: String,
    },
}

impl InboundEvent {
    /// Create a text event
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    /// Create a button-reply event
    #[must_use]
    pub fn button_reply(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::ButtonReply {
            id: id.into(),
            title: title.into(),
        }
    }

    /// Whether the reply reads as an affirmative answer
    #[must_use]
    pub fn is_affirmative(&self) -> bool {
        match self {
            Self::ButtonReply { id, .. } => id == "confirm_yes",
            Self::Text { body } => matches!(
                body.trim().to_lowercase().as_str(),
                "yes" | "y" | "ok" | "okay" | "confirm" | "proceed"
            ),
        }
    }
}
