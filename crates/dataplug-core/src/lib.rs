//! Dataplug Core - Conversation Engine and Purchase Pipeline
//!
//! This crate contains the domain logic of the Dataplug chat-commerce
//! backend:
//! - Conversation engine: a pure state machine driving the purchase flow
//! - Plan catalog: the server-trusted plan id -> title/price lookup
//! - Purchase pipeline: initiate/reconcile with idempotent settlement
//! - Stores: conversation state, purchases and audit/error logs
//!   (SQLite via sqlx, plus an in-memory backend for tests)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod event;
pub mod intent;
pub mod purchase;
pub mod sqlite_store;
pub mod store;

pub use audit::{AuditEntry, AuditSink, ErrorEntry};
pub use catalog::Plan;
pub use engine::{ConversationState, Engine, EngineOutcome, TempData};
pub use error::{Error, Result};
pub use event::InboundEvent;
pub use intent::Intent;
pub use purchase::{
    CallbackProvider, PaymentProvider, Purchase, PurchasePipeline, PurchaseStatus,
    SettlementOutcome,
};
pub use sqlite_store::SqliteStore;
pub use store::{AuditStore, ConversationRecord, MemoryStore, PurchaseStore, StateStore};
