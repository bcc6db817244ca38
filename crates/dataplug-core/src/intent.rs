//! Intents - abstract outbound instructions emitted by the engine
//!
//! An intent describes what should happen next (show plans, start a
//! purchase) independent of provider message formatting. The channel
//! adapter maps each intent to exactly one provider payload.

use serde::{Deserialize, Serialize};

/// An outbound action requested by the conversation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    /// Present the plan catalog as interactive buttons
    ShowAvailablePlans,
    /// Ask the user to confirm payment for the selected plan
    AskPaymentConfirmation {
        /// The selected plan id
        plan_id: String,
    },
    /// Start the purchase pipeline for the confirmed plan
    InitiatePurchase {
        /// The confirmed plan id
        plan_id: String,
    },
    /// Tell the user their payment is still in flight
    PaymentStillProcessing,
    /// Tell the user something went wrong (generic, no raw error text)
    ReportError,
}

impl Intent {
    /// Whether this intent is delivered as a message (as opposed to a
    /// commerce action handled by the purchase pipeline)
    #[must_use]
    pub fn is_message(&self) -> bool {
        !matches!(self, Self::InitiatePurchase { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_vs_commerce() {
        assert!(Intent::ShowAvailablePlans.is_message());
        assert!(Intent::PaymentStillProcessing.is_message());
        assert!(!Intent::InitiatePurchase {
            plan_id: "1gb_379".into()
        }
        .is_message());
    }
}
