//! Audit/error sink - append-only observability writes
//!
//! `record*` calls never fail visibly to the caller: a failure to write
//! the audit trail must never abort the conversation flow. Internal
//! write failures are downgraded to a `tracing::warn!`.

use crate::store::AuditStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// One audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Phone number the entry relates to
    pub phone: String,
    /// Event/action tag (e.g. `state_transition`, `purchase_initiated`)
    pub kind: String,
    /// Free-form payload for post-hoc debugging
    pub payload: serde_json::Value,
    /// Server-set timestamp
    pub created_at: DateTime<Utc>,
}

/// One error log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Phone number, when the error is attributable to a user
    pub phone: Option<String>,
    /// Code location tag (e.g. `engine.handle_event`)
    pub location: String,
    /// Error message
    pub message: String,
    /// Server-set timestamp
    pub created_at: DateTime<Utc>,
}

/// Non-failing wrapper over an [`AuditStore`]
#[derive(Clone)]
pub struct AuditSink {
    store: Arc<dyn AuditStore>,
}

impl AuditSink {
    /// Create a sink over the given store
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Append an audit entry; failure is logged and dropped
    pub async fn record(&self, kind: &str, phone: &str, payload: serde_json::Value) {
        let entry = AuditEntry {
            phone: phone.to_string(),
            kind: kind.to_string(),
            payload,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.append_audit(&entry).await {
            warn!(kind = %entry.kind, phone = %entry.phone, error = %e, "audit write failed");
        }
    }

    /// Append an error entry; failure is logged and dropped
    pub async fn record_error(&self, location: &str, phone: Option<&str>, message: &str) {
        let entry = ErrorEntry {
            phone: phone.map(str::to_string),
            location: location.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.append_error(&entry).await {
            warn!(location = %entry.location, error = %e, "error-log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_record_appends() {
        let store = Arc::new(MemoryStore::new());
        let sink = AuditSink::new(store.clone());

        sink.record(
            "state_transition",
            "2347063255405",
            serde_json::json!({"from": "start", "to": "awaiting_plan_selection"}),
        )
        .await;

        let entries = store.audit_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, "state_transition");
    }

    #[tokio::test]
    async fn test_record_error_appends() {
        let store = Arc::new(MemoryStore::new());
        let sink = AuditSink::new(store.clone());

        sink.record_error("gateway.send", Some("234111"), "timeout")
            .await;

        let entries = store.error_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].location, "gateway.send");
        assert_eq!(entries[0].phone.as_deref(), Some("234111"));
    }
}
