//! Storage traits and the in-memory backend
//!
//! Conversation state writes use a versioned compare-and-set so that two
//! concurrent webhook deliveries for the same phone number cannot both
//! apply divergent transitions. Purchases and audit entries are
//! append-only.

use crate::audit::{AuditEntry, ErrorEntry};
use crate::engine::{ConversationState, TempData};
use crate::error::{Error, Result};
use crate::purchase::{Purchase, PurchaseStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// One conversation record per phone number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Phone number of the user (E.164-like)
    pub phone: String,
    /// Current conversation state
    pub state: ConversationState,
    /// In-progress selections
    pub temp_data: TempData,
    /// Version the record was loaded at (CAS token)
    pub version: i64,
    /// Server-set on every write
    pub last_updated: DateTime<Utc>,
}

impl ConversationRecord {
    /// Fresh record for an unseen phone number (not yet persisted)
    #[must_use]
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            state: ConversationState::Start,
            temp_data: TempData::default(),
            version: 0,
            last_updated: Utc::now(),
        }
    }
}

/// Durable phone -> conversation state mapping
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the record for a phone number, or a fresh `version = 0`
    /// record if the number has never been seen.
    async fn load(&self, phone: &str) -> Result<ConversationRecord>;

    /// Persist a record, requiring that the stored version still equals
    /// `record.version`. On success the stored version becomes
    /// `record.version + 1`.
    ///
    /// # Errors
    ///
    /// `ConcurrentStateConflict` if another writer won the race,
    /// `PersistenceUnavailable` if the store is unreachable.
    async fn save(&self, record: &ConversationRecord) -> Result<()>;
}

/// Append-only purchase records
#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// Insert a new pending purchase
    async fn insert(&self, purchase: &Purchase) -> Result<()>;

    /// Find a purchase by payment reference
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Purchase>>;

    /// Apply a terminal status to a purchase that is still pending
    ///
    /// The write is conditional on the stored status being `Pending`;
    /// `Ok(false)` means a concurrent settlement got there first and
    /// nothing was overwritten.
    async fn update_status(&self, reference: &str, status: PurchaseStatus) -> Result<bool>;
}

/// Append-only audit and error logs
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append an audit entry
    async fn append_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// Append an error entry
    async fn append_error(&self, entry: &ErrorEntry) -> Result<()>;
}

/// In-memory store backing all three storage traits
///
/// Used by tests; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<String, ConversationRecord>>,
    purchases: Mutex<Vec<Purchase>>,
    audit: Mutex<Vec<AuditEntry>>,
    errors: Mutex<Vec<ErrorEntry>>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded audit entries (test helper)
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.lock().expect("audit lock poisoned").clone()
    }

    /// Snapshot of recorded error entries (test helper)
    pub fn error_entries(&self) -> Vec<ErrorEntry> {
        self.errors.lock().expect("errors lock poisoned").clone()
    }

    /// Snapshot of stored purchases (test helper)
    pub fn purchases(&self) -> Vec<Purchase> {
        self.purchases.lock().expect("purchases lock poisoned").clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, phone: &str) -> Result<ConversationRecord> {
        let conversations = self
            .conversations
            .lock()
            .map_err(|_| Error::PersistenceUnavailable("conversation lock poisoned".into()))?;
        Ok(conversations
            .get(phone)
            .cloned()
            .unwrap_or_else(|| ConversationRecord::new(phone)))
    }

    async fn save(&self, record: &ConversationRecord) -> Result<()> {
        let mut conversations = self
            .conversations
            .lock()
            .map_err(|_| Error::PersistenceUnavailable("conversation lock poisoned".into()))?;

        let stored_version = conversations.get(&record.phone).map_or(0, |r| r.version);
        if stored_version != record.version {
            return Err(Error::ConcurrentStateConflict(record.phone.clone()));
        }

        let mut next = record.clone();
        next.version = record.version + 1;
        next.last_updated = Utc::now();
        conversations.insert(record.phone.clone(), next);
        Ok(())
    }
}

#[async_trait]
impl PurchaseStore for MemoryStore {
    async fn insert(&self, purchase: &Purchase) -> Result<()> {
        let mut purchases = self
            .purchases
            .lock()
            .map_err(|_| Error::PersistenceUnavailable("purchase lock poisoned".into()))?;
        purchases.push(purchase.clone());
        Ok(())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Purchase>> {
        let purchases = self
            .purchases
            .lock()
            .map_err(|_| Error::PersistenceUnavailable("purchase lock poisoned".into()))?;
        Ok(purchases
            .iter()
            .find(|p| p.payment_reference == reference)
            .cloned())
    }

    async fn update_status(&self, reference: &str, status: PurchaseStatus) -> Result<bool> {
        let mut purchases = self
            .purchases
            .lock()
            .map_err(|_| Error::PersistenceUnavailable("purchase lock poisoned".into()))?;
        match purchases
            .iter_mut()
            .find(|p| p.payment_reference == reference)
        {
            Some(purchase) if purchase.status == PurchaseStatus::Pending => {
                purchase.status = status;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(Error::PurchaseNotFound(reference.to_string())),
        }
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let mut audit = self
            .audit
            .lock()
            .map_err(|_| Error::PersistenceUnavailable("audit lock poisoned".into()))?;
        audit.push(entry.clone());
        Ok(())
    }

    async fn append_error(&self, entry: &ErrorEntry) -> Result<()> {
        let mut errors = self
            .errors
            .lock()
            .map_err(|_| Error::PersistenceUnavailable("error lock poisoned".into()))?;
        errors.push(entry.clone());
        Ok(())
    }
}
