//! Conversation engine - the purchase-flow state machine
//!
//! The transition logic is a pure function of
//! `(current state, temp data, inbound event)`. The [`Engine`] wraps it
//! with persistence: load the record, compute the transition, save with
//! compare-and-set (one retry on a lost race), write the audit trail,
//! then hand the intents back to the dispatcher. State is always
//! persisted before any outbound delivery happens, so a crash between
//! persist and delivery is recovered by re-delivery, not by re-deriving
//! state.

use crate::audit::AuditSink;
use crate::catalog;
use crate::error::{Error, Result};
use crate::event::InboundEvent;
use crate::intent::Intent;
use crate::store::{ConversationRecord, StateStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Conversation states
///
/// `Done` and `Error` are soft-terminal: the next inbound event restarts
/// the flow as if from `Start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// Initial state for any unseen phone number
    Start,
    /// Plans shown, waiting for the user to pick one
    AwaitingPlanSelection,
    /// Plan picked, waiting for payment confirmation
    AwaitingPaymentConfirmation,
    /// Purchase handed to the payment provider; uninterruptible
    PaymentInProgress,
    /// Flow completed (soft-terminal)
    Done,
    /// Flow aborted on error (soft-terminal)
    Error,
}

impl ConversationState {
    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::AwaitingPlanSelection => "awaiting_plan_selection",
            Self::AwaitingPaymentConfirmation => "awaiting_payment_confirmation",
            Self::PaymentInProgress => "payment_in_progress",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Whether the next inbound event restarts the flow
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConversationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(Self::Start),
            "awaiting_plan_selection" => Ok(Self::AwaitingPlanSelection),
            "awaiting_payment_confirmation" => Ok(Self::AwaitingPaymentConfirmation),
            "payment_in_progress" => Ok(Self::PaymentInProgress),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            other => Err(Error::Internal(format!(
                "unknown conversation state: {other}"
            ))),
        }
    }
}

/// In-progress selections carried between events
///
/// Known fields are typed; `extra` holds anything a future flow step
/// stashes that the engine does not interpret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TempData {
    /// Selected plan id, set once the user picks a plan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    /// Phone number as typed by the user (may differ from sender)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_phone_input: Option<String>,
    /// Opaque remainder
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Result of one transition: the state to persist plus the intents to
/// dispatch after persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Next conversation state
    pub state: ConversationState,
    /// Temp data to persist alongside it
    pub temp_data: TempData,
    /// Outbound intents, in dispatch order
    pub intents: Vec<Intent>,
}

/// Pure transition function
///
/// No I/O; given the same inputs it always produces the same transition.
#[must_use]
pub fn transition(
    state: ConversationState,
    temp_data: &TempData,
    event: &InboundEvent,
) -> Transition {
    // Soft-terminal states clear themselves on the next interaction.
    let state = if state.is_terminal() {
        ConversationState::Start
    } else {
        state
    };

    match state {
        ConversationState::Start => Transition {
            state: ConversationState::AwaitingPlanSelection,
            temp_data: TempData::default(),
            intents: vec![Intent::ShowAvailablePlans],
        },

        ConversationState::AwaitingPlanSelection => match event {
            InboundEvent::ButtonReply { id, .. } if catalog::find(id).is_some() => {
                let mut temp_data = temp_data.clone();
                temp_data.plan_id = Some(id.clone());
                Transition {
                    state: ConversationState::AwaitingPaymentConfirmation,
                    temp_data,
                    intents: vec![Intent::AskPaymentConfirmation { plan_id: id.clone() }],
                }
            }
            // Unrecognized reply (including unknown plan ids): re-prompt.
            _ => Transition {
                state: ConversationState::AwaitingPlanSelection,
                temp_data: temp_data.clone(),
                intents: vec![Intent::ShowAvailablePlans],
            },
        },

        ConversationState::AwaitingPaymentConfirmation => {
            if event.is_affirmative() {
                match &temp_data.plan_id {
                    Some(plan_id) => Transition {
                        state: ConversationState::PaymentInProgress,
                        temp_data: temp_data.clone(),
                        intents: vec![Intent::InitiatePurchase {
                            plan_id: plan_id.clone(),
                        }],
                    },
                    // Confirmation without a stored selection is an
                    // invariant violation, not a user mistake.
                    None => Transition {
                        state: ConversationState::Error,
                        temp_data: temp_data.clone(),
                        intents: vec![Intent::ReportError],
                    },
                }
            } else {
                Transition {
                    state: ConversationState::AwaitingPlanSelection,
                    temp_data: TempData::default(),
                    intents: vec![Intent::ShowAvailablePlans],
                }
            }
        }

        ConversationState::PaymentInProgress => Transition {
            state: ConversationState::PaymentInProgress,
            temp_data: temp_data.clone(),
            intents: vec![Intent::PaymentStillProcessing],
        },

        // Handled by the terminal reset above.
        ConversationState::Done | ConversationState::Error => unreachable!(),
    }
}

/// What the engine hands back to the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutcome {
    /// Persisted conversation state
    pub state: ConversationState,
    /// Persisted temp data
    pub temp_data: TempData,
    /// Intents to dispatch
    pub intents: Vec<Intent>,
}

/// Driver around the pure transition function
///
/// Owns the injected state store and audit sink; serializes writes per
/// phone number via the store's compare-and-set.
pub struct Engine {
    store: Arc<dyn StateStore>,
    audit: AuditSink,
}

impl Engine {
    /// Create an engine over the given store and audit sink
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, audit: AuditSink) -> Self {
        Self { store, audit }
    }

    /// Handle one inbound event for a phone number
    ///
    /// Loads the record, computes the transition, persists it (retrying
    /// the full cycle once on a lost CAS race) and writes the audit
    /// trail before returning the intents.
    ///
    /// # Errors
    ///
    /// `ConcurrentStateConflict` if both attempts lose the race;
    /// `PersistenceUnavailable` if the store is down.
    #[instrument(skip(self, event), fields(phone = %phone))]
    pub async fn handle_event(&self, phone: &str, event: &InboundEvent) -> Result<EngineOutcome> {
        for attempt in 0..2 {
            let record = self.store.load(phone).await?;
            let from = record.state;
            let next = transition(record.state, &record.temp_data, event);

            let to_save = ConversationRecord {
                phone: record.phone.clone(),
                state: next.state,
                temp_data: next.temp_data.clone(),
                version: record.version,
                last_updated: record.last_updated,
            };

            match self.store.save(&to_save).await {
                Ok(()) => {
                    self.audit
                        .record(
                            "state_transition",
                            phone,
                            serde_json::json!({
                                "from": from.as_str(),
                                "to": next.state.as_str(),
                                "event": event,
                            }),
                        )
                        .await;
                    debug!(from = %from, to = %next.state, "conversation transition");
                    return Ok(EngineOutcome {
                        state: next.state,
                        temp_data: next.temp_data,
                        intents: next.intents,
                    });
                }
                Err(Error::ConcurrentStateConflict(_)) if attempt == 0 => {
                    warn!("lost conversation write race, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::ConcurrentStateConflict(phone.to_string()))
    }

    /// Force the conversation into the error state after an unparseable
    /// inbound payload, returning the generic error intent.
    #[instrument(skip(self), fields(phone = %phone))]
    pub async fn handle_malformed(&self, phone: &str, reason: &str) -> Result<EngineOutcome> {
        for attempt in 0..2 {
            let record = self.store.load(phone).await?;
            let to_save = ConversationRecord {
                state: ConversationState::Error,
                ..record
            };

            match self.store.save(&to_save).await {
                Ok(()) => {
                    self.audit
                        .record_error("engine.handle_malformed", Some(phone), reason)
                        .await;
                    return Ok(EngineOutcome {
                        state: ConversationState::Error,
                        temp_data: to_save.temp_data,
                        intents: vec![Intent::ReportError],
                    });
                }
                Err(Error::ConcurrentStateConflict(_)) if attempt == 0 => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::ConcurrentStateConflict(phone.to_string()))
    }

    /// Close out the conversation after settlement
    ///
    /// Paid purchases land in `Done`; failed or cancelled ones in
    /// `Error`. Both are soft-terminal, so the next message restarts
    /// the flow.
    #[instrument(skip(self), fields(phone = %phone))]
    pub async fn settle(&self, phone: &str, paid: bool) -> Result<()> {
        let target = if paid {
            ConversationState::Done
        } else {
            ConversationState::Error
        };

        for attempt in 0..2 {
            let record = self.store.load(phone).await?;
            let to_save = ConversationRecord {
                state: target,
                temp_data: TempData::default(),
                ..record
            };

            match self.store.save(&to_save).await {
                Ok(()) => {
                    self.audit
                        .record(
                            "conversation_settled",
                            phone,
                            serde_json::json!({ "state": target.as_str() }),
                        )
                        .await;
                    return Ok(());
                }
                Err(Error::ConcurrentStateConflict(_)) if attempt == 0 => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::ConcurrentStateConflict(phone.to_string()))
    }
}
