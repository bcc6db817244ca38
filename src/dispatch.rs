//! Dispatcher - glue between webhook, engine, gateway and pipeline
//!
//! One inbound webhook message flows: parse → engine (persist first) →
//! intents → gateway delivery and/or purchase pipeline. Persistence
//! failures bubble up (the webhook handler answers 5xx so the provider
//! retries); everything else is absorbed into the error log and a
//! generic user-facing message.

use dataplug_channels::{DeliveryResult, MessageGateway, WebhookMessage, WhatsAppBusinessAdapter};
use dataplug_core::{
    AuditSink, ConversationState, Engine, EngineOutcome, Error, Intent, Purchase,
    PurchasePipeline, SettlementOutcome, TempData,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Per-request dispatcher over injected collaborators
pub struct Dispatcher {
    engine: Arc<Engine>,
    pipeline: Arc<PurchasePipeline>,
    gateway: Arc<dyn MessageGateway>,
    audit: AuditSink,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(
        engine: Arc<Engine>,
        pipeline: Arc<PurchasePipeline>,
        gateway: Arc<dyn MessageGateway>,
        audit: AuditSink,
    ) -> Self {
        Self {
            engine,
            pipeline,
            gateway,
            audit,
        }
    }

    /// Process one inbound webhook message end to end
    ///
    /// # Errors
    ///
    /// Only `PersistenceUnavailable` propagates; the caller maps it to
    /// an HTTP 5xx so the provider redelivers.
    #[instrument(skip(self, msg), fields(from = %msg.from))]
    pub async fn process_message(&self, msg: &WebhookMessage) -> dataplug_core::Result<()> {
        if let Err(e) = self.gateway.mark_as_read(&msg.id).await {
            debug!(error = %e, "mark_as_read failed");
        }

        let phone = msg.from.clone();
        let outcome = match WhatsAppBusinessAdapter::parse_inbound(msg) {
            Ok(event) => match self.engine.handle_event(&phone, &event).await {
                Ok(outcome) => outcome,
                Err(Error::ConcurrentStateConflict(_)) => {
                    // Race loser: generic re-prompt, never a visible error.
                    warn!("concurrent state conflict, re-prompting");
                    EngineOutcome {
                        state: ConversationState::AwaitingPlanSelection,
                        temp_data: TempData::default(),
                        intents: vec![Intent::ShowAvailablePlans],
                    }
                }
                Err(e) => return Err(e),
            },
            Err(Error::MalformedInboundEvent(reason)) => {
                self.engine.handle_malformed(&phone, &reason).await?
            }
            Err(e) => return Err(e),
        };

        for intent in &outcome.intents {
            self.dispatch_intent(&phone, &outcome.temp_data, intent)
                .await?;
        }
        Ok(())
    }

    async fn dispatch_intent(
        &self,
        phone: &str,
        temp_data: &TempData,
        intent: &Intent,
    ) -> dataplug_core::Result<()> {
        match intent {
            Intent::InitiatePurchase { plan_id } => {
                match self
                    .pipeline
                    .initiate(phone, temp_data.user_phone_input.as_deref(), plan_id)
                    .await
                {
                    Ok(purchase) => {
                        let body = format!(
                            "Payment started for {} (₦{}). Reference: {}.",
                            purchase.plan_title, purchase.amount, purchase.payment_reference
                        );
                        if let Err(e) = self.gateway.send_text(phone, &body).await {
                            self.audit
                                .record_error("dispatch.send_text", Some(phone), &e.to_string())
                                .await;
                        }
                    }
                    Err(e @ Error::PersistenceUnavailable(_)) => return Err(e),
                    Err(e) => {
                        self.audit
                            .record_error("dispatch.initiate", Some(phone), &e.to_string())
                            .await;
                        // No settlement callback will ever arrive for a
                        // purchase that never started; unstick the
                        // conversation from PaymentInProgress.
                        self.engine.settle(phone, false).await?;
                        self.deliver(phone, &Intent::ReportError).await;
                    }
                }
            }
            message_intent => self.deliver(phone, message_intent).await,
        }
        Ok(())
    }

    /// Deliver a message intent; a failed delivery only feeds the error log
    async fn deliver(&self, phone: &str, intent: &Intent) {
        if let DeliveryResult::Failed { reason } = self.gateway.send_intent(phone, intent).await {
            self.audit
                .record_error("gateway.send", Some(phone), &reason)
                .await;
        }
    }

    /// Apply a provider settlement callback
    ///
    /// Reconciles the purchase, closes out the conversation and notifies
    /// the user.
    #[instrument(skip(self), fields(reference = %reference))]
    pub async fn process_settlement(
        &self,
        reference: &str,
        outcome: SettlementOutcome,
    ) -> dataplug_core::Result<Purchase> {
        let purchase = self.pipeline.reconcile(reference, outcome).await?;
        let paid = matches!(outcome, SettlementOutcome::Paid);

        self.engine.settle(&purchase.phone, paid).await?;

        let body = if paid {
            format!(
                "Payment received! Your {} plan is on the way.",
                purchase.plan_title
            )
        } else {
            "Your payment didn't complete. Reply 'hi' to try again.".to_string()
        };
        if let Err(e) = self.gateway.send_text(&purchase.phone, &body).await {
            self.audit
                .record_error("dispatch.send_text", Some(&purchase.phone), &e.to_string())
                .await;
        }

        Ok(purchase)
    }
}
