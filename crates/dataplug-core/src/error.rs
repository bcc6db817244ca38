//! Error types for dataplug-core

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Plan id not present in the catalog
    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    /// A repeat settlement disagreed with the recorded outcome
    #[error("conflicting settlement for {reference}: recorded {recorded}, attempted {attempted}")]
    ConflictingSettlement {
        /// Payment reference of the purchase
        reference: String,
        /// Status already recorded
        recorded: String,
        /// Status the repeat reconcile attempted to apply
        attempted: String,
    },

    /// Lost a compare-and-set race on the conversation record
    #[error("concurrent state conflict for {0}")]
    ConcurrentStateConflict(String),

    /// Outbound message could not be delivered (after fallback)
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// Inbound webhook payload could not be parsed into an event
    #[error("malformed inbound event: {0}")]
    MalformedInboundEvent(String),

    /// Backing store is unreachable or rejected the write
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    /// No purchase exists for the given payment reference
    #[error("purchase not found: {0}")]
    PurchaseNotFound(String),

    /// Internal error (serialization, invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
