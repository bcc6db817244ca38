//! Purchase pipeline - initiate and reconcile data-plan purchases
//!
//! A pending record is persisted before the payment provider is ever
//! called, so an attempted payment always has a purchase to settle
//! against. Settlement is idempotent: a repeat with the same terminal
//! outcome is a no-op, a repeat with a different outcome is a
//! `ConflictingSettlement` that is escalated to the error log and never
//! silently overwritten.

use crate::audit::AuditSink;
use crate::catalog::{self, Plan, CURRENCY};
use crate::error::{Error, Result};
use crate::store::PurchaseStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Terminal and pending purchase statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    /// Created, payment not yet settled
    Pending,
    /// Payment confirmed
    Paid,
    /// Payment failed
    Failed,
    /// Payment cancelled by the user or provider
    Cancelled,
}

impl PurchaseStatus {
    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the status can never change again
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PurchaseStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::Internal(format!("unknown purchase status: {other}"))),
        }
    }
}

/// Provider-reported settlement outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementOutcome {
    /// Payment went through
    Paid,
    /// Payment failed
    Failed,
    /// Payment was cancelled
    Cancelled,
}

impl SettlementOutcome {
    /// The purchase status this outcome settles to
    #[must_use]
    pub fn status(&self) -> PurchaseStatus {
        match self {
            Self::Paid => PurchaseStatus::Paid,
            Self::Failed => PurchaseStatus::Failed,
            Self::Cancelled => PurchaseStatus::Cancelled,
        }
    }
}

/// One attempted data-plan purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    /// Generated record id
    pub id: Uuid,
    /// Sender phone number
    pub phone: String,
    /// Phone number as typed by the user (defaults to sender)
    pub user_phone_input: String,
    /// Catalog plan id
    pub plan_id: String,
    /// Title copied from the catalog, never from the client
    pub plan_title: String,
    /// Mobile network the plan is provisioned on
    pub network: Option<String>,
    /// Price copied from the catalog, never from the client
    pub amount: u32,
    /// Display currency
    pub currency: String,
    /// Payment provider name
    pub payment_provider: String,
    /// Generated settlement reference
    pub payment_reference: String,
    /// Settlement status
    pub status: PurchaseStatus,
    /// Free-form provider metadata
    pub metadata: serde_json::Value,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Purchase {
    /// Build a pending purchase from a catalog plan
    #[must_use]
    pub fn pending(
        phone: impl Into<String>,
        user_phone_input: Option<&str>,
        plan: &Plan,
        provider: impl Into<String>,
    ) -> Self {
        let phone = phone.into();
        let user_phone_input = user_phone_input.unwrap_or(&phone).to_string();
        Self {
            id: Uuid::new_v4(),
            user_phone_input,
            phone,
            plan_id: plan.id.to_string(),
            plan_title: plan.title.to_string(),
            network: Some(plan.network.to_string()),
            amount: plan.price,
            currency: CURRENCY.to_string(),
            payment_provider: provider.into(),
            payment_reference: format!("DP-{}", Uuid::new_v4().simple()),
            status: PurchaseStatus::Pending,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }
}

/// Seam to the external payment provider
///
/// `charge` only kicks off the payment; settlement arrives later through
/// the reconcile callback.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Provider name recorded on the purchase
    fn name(&self) -> &str;

    /// Request payment for a pending purchase
    async fn charge(&self, purchase: &Purchase) -> Result<()>;
}

/// Provider that waits for an external settlement callback
///
/// The charge request is recorded and nothing else happens until the
/// payment webhook arrives.
#[derive(Debug, Default)]
pub struct CallbackProvider;

#[async_trait]
impl PaymentProvider for CallbackProvider {
    fn name(&self) -> &str {
        "callback"
    }

    async fn charge(&self, purchase: &Purchase) -> Result<()> {
        info!(
            reference = %purchase.payment_reference,
            amount = purchase.amount,
            "charge requested, awaiting settlement callback"
        );
        Ok(())
    }
}

/// Validates selections, reserves pending purchases and reconciles
/// settlements.
pub struct PurchasePipeline {
    store: Arc<dyn PurchaseStore>,
    provider: Arc<dyn PaymentProvider>,
    audit: AuditSink,
}

impl PurchasePipeline {
    /// Create a pipeline over the given store and provider
    #[must_use]
    pub fn new(
        store: Arc<dyn PurchaseStore>,
        provider: Arc<dyn PaymentProvider>,
        audit: AuditSink,
    ) -> Self {
        Self {
            store,
            provider,
            audit,
        }
    }

    /// Reserve a pending purchase and request payment
    ///
    /// The pending record is persisted before the provider call; if the
    /// charge request itself fails the purchase is settled as failed.
    ///
    /// # Errors
    ///
    /// `UnknownPlan` if the id is not in the catalog,
    /// `PersistenceUnavailable` if the store is down, or the provider's
    /// error if the charge request fails.
    #[instrument(skip(self), fields(phone = %phone, plan_id = %plan_id))]
    pub async fn initiate(
        &self,
        phone: &str,
        user_phone_input: Option<&str>,
        plan_id: &str,
    ) -> Result<Purchase> {
        let plan =
            catalog::find(plan_id).ok_or_else(|| Error::UnknownPlan(plan_id.to_string()))?;

        let purchase = Purchase::pending(phone, user_phone_input, plan, self.provider.name());
        self.store.insert(&purchase).await?;
        self.audit
            .record(
                "purchase_initiated",
                phone,
                serde_json::json!({
                    "reference": purchase.payment_reference,
                    "plan_id": purchase.plan_id,
                    "amount": purchase.amount,
                }),
            )
            .await;

        if let Err(e) = self.provider.charge(&purchase).await {
            warn!(reference = %purchase.payment_reference, error = %e, "charge request failed");
            self.store
                .update_status(&purchase.payment_reference, PurchaseStatus::Failed)
                .await?;
            self.audit
                .record_error("pipeline.initiate", Some(phone), &e.to_string())
                .await;
            return Err(e);
        }

        info!(reference = %purchase.payment_reference, "purchase pending");
        Ok(purchase)
    }

    /// Apply a settlement outcome to a pending purchase
    ///
    /// Idempotent: a repeat with the outcome already recorded returns
    /// the stored record unchanged.
    ///
    /// # Errors
    ///
    /// `PurchaseNotFound` for an unknown reference,
    /// `ConflictingSettlement` if the purchase already settled to a
    /// different terminal status.
    #[instrument(skip(self), fields(reference = %reference))]
    pub async fn reconcile(
        &self,
        reference: &str,
        outcome: SettlementOutcome,
    ) -> Result<Purchase> {
        let existing = self
            .store
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| Error::PurchaseNotFound(reference.to_string()))?;

        let target = outcome.status();

        if existing.status == target {
            info!(status = %target, "repeat settlement, no-op");
            return Ok(existing);
        }

        if existing.status.is_terminal() {
            return Err(self
                .conflicting(reference, &existing.phone, existing.status, target)
                .await);
        }

        if !self.store.update_status(reference, target).await? {
            // The conditional write lost to a concurrent settlement.
            // Re-read and resolve against what actually got recorded.
            let current = self
                .store
                .find_by_reference(reference)
                .await?
                .ok_or_else(|| Error::PurchaseNotFound(reference.to_string()))?;
            if current.status == target {
                info!(status = %target, "repeat settlement, no-op");
                return Ok(current);
            }
            return Err(self
                .conflicting(reference, &current.phone, current.status, target)
                .await);
        }

        self.audit
            .record(
                "purchase_settled",
                &existing.phone,
                serde_json::json!({
                    "reference": reference,
                    "status": target.as_str(),
                }),
            )
            .await;
        info!(status = %target, "purchase settled");

        Ok(Purchase {
            status: target,
            ..existing
        })
    }

    async fn conflicting(
        &self,
        reference: &str,
        phone: &str,
        recorded: PurchaseStatus,
        attempted: PurchaseStatus,
    ) -> Error {
        let err = Error::ConflictingSettlement {
            reference: reference.to_string(),
            recorded: recorded.to_string(),
            attempted: attempted.to_string(),
        };
        self.audit
            .record_error("pipeline.reconcile", Some(phone), &err.to_string())
            .await;
        err
    }
}
