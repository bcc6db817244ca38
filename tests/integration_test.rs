//! End-to-end conversation flow over the in-memory store
//!
//! Drives the same path the webhook handler takes: provider payload →
//! parse → engine → intents → purchase pipeline → settlement.

use dataplug_channels::{WhatsAppBusinessAdapter, WhatsAppBusinessWebhook};
use dataplug_core::{
    AuditSink, ConversationState, Engine, Error, InboundEvent, Intent, MemoryStore,
    PurchasePipeline, PurchaseStatus, SettlementOutcome, StateStore,
};
use dataplug_core::purchase::CallbackProvider;
use std::sync::Arc;

fn components() -> (Engine, PurchasePipeline, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let audit = AuditSink::new(store.clone());
    let engine = Engine::new(store.clone(), audit.clone());
    let pipeline = PurchasePipeline::new(store.clone(), Arc::new(CallbackProvider), audit);
    (engine, pipeline, store)
}

fn webhook_with_text(from: &str, body: &str) -> WhatsAppBusinessWebhook {
    serde_json::from_value(serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "waba",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "messages": [{
                        "from": from,
                        "id": "wamid.e2e",
                        "timestamp": "1700000000",
                        "type": "text",
                        "text": { "body": body },
                    }],
                }
            }]
        }]
    }))
    .unwrap()
}

#[tokio::test]
async fn full_purchase_flow() {
    let (engine, pipeline, store) = components();
    let phone = "2347063255405";

    // Inbound "hi" arrives as a provider webhook payload.
    let webhook = webhook_with_text(phone, "hi");
    let messages = webhook.messages();
    assert_eq!(messages.len(), 1);
    let event = WhatsAppBusinessAdapter::parse_inbound(&messages[0]).unwrap();
    assert_eq!(event, InboundEvent::text("hi"));

    let outcome = engine.handle_event(phone, &event).await.unwrap();
    assert_eq!(outcome.state, ConversationState::AwaitingPlanSelection);
    assert_eq!(outcome.intents, vec![Intent::ShowAvailablePlans]);

    // User taps the 1GB button.
    let outcome = engine
        .handle_event(phone, &InboundEvent::button_reply("1gb_379", "1GB — ₦379"))
        .await
        .unwrap();
    assert_eq!(outcome.state, ConversationState::AwaitingPaymentConfirmation);
    assert_eq!(outcome.temp_data.plan_id.as_deref(), Some("1gb_379"));

    // User confirms; the engine hands the purchase to the pipeline.
    let outcome = engine
        .handle_event(phone, &InboundEvent::button_reply("confirm_yes", "Yes, pay"))
        .await
        .unwrap();
    assert_eq!(outcome.state, ConversationState::PaymentInProgress);
    let Intent::InitiatePurchase { plan_id } = &outcome.intents[0] else {
        panic!("expected InitiatePurchase, got {:?}", outcome.intents);
    };

    let purchase = pipeline.initiate(phone, None, plan_id).await.unwrap();
    assert_eq!(purchase.amount, 379);
    assert_eq!(purchase.plan_title, "1GB");
    assert_eq!(purchase.status, PurchaseStatus::Pending);

    // Messages during payment don't interrupt it.
    let outcome = engine
        .handle_event(phone, &InboundEvent::text("is it done yet?"))
        .await
        .unwrap();
    assert_eq!(outcome.state, ConversationState::PaymentInProgress);
    assert_eq!(outcome.intents, vec![Intent::PaymentStillProcessing]);

    // Provider settles the payment.
    let settled = pipeline
        .reconcile(&purchase.payment_reference, SettlementOutcome::Paid)
        .await
        .unwrap();
    assert_eq!(settled.status, PurchaseStatus::Paid);
    engine.settle(phone, true).await.unwrap();

    let record = store.load(phone).await.unwrap();
    assert_eq!(record.state, ConversationState::Done);

    // Repeat settlement with the same outcome is a no-op...
    let again = pipeline
        .reconcile(&purchase.payment_reference, SettlementOutcome::Paid)
        .await
        .unwrap();
    assert_eq!(again.status, PurchaseStatus::Paid);

    // ...but a different outcome is a conflict.
    let err = pipeline
        .reconcile(&purchase.payment_reference, SettlementOutcome::Failed)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingSettlement { .. }));

    // The audit trail saw every transition and the settlement.
    let kinds: Vec<String> = store
        .audit_entries()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&"state_transition".to_string()));
    assert!(kinds.contains(&"purchase_initiated".to_string()));
    assert!(kinds.contains(&"purchase_settled".to_string()));
}

#[tokio::test]
async fn unknown_plan_selection_reprompts_instead_of_crashing() {
    let (engine, _, _) = components();
    let phone = "2348012345678";

    engine
        .handle_event(phone, &InboundEvent::text("hi"))
        .await
        .unwrap();
    let outcome = engine
        .handle_event(phone, &InboundEvent::button_reply("unknown_plan", "???"))
        .await
        .unwrap();

    assert_eq!(outcome.state, ConversationState::AwaitingPlanSelection);
    assert_eq!(outcome.intents, vec![Intent::ShowAvailablePlans]);
}

#[tokio::test]
async fn catalog_prices_are_never_client_supplied() {
    let (engine, pipeline, _) = components();
    let phone = "2348098765432";

    engine
        .handle_event(phone, &InboundEvent::text("hi"))
        .await
        .unwrap();
    // Title in the button reply claims a different price; the purchase
    // still carries the catalog's.
    engine
        .handle_event(phone, &InboundEvent::button_reply("500mb_299", "500MB — ₦1"))
        .await
        .unwrap();
    engine
        .handle_event(phone, &InboundEvent::text("yes"))
        .await
        .unwrap();

    let purchase = pipeline.initiate(phone, None, "500mb_299").await.unwrap();
    assert_eq!(purchase.amount, 299);
    assert_eq!(purchase.plan_title, "500MB");
}

#[tokio::test]
async fn concurrent_webhooks_serialize_per_phone() {
    let (engine, _, store) = components();
    let engine = Arc::new(engine);
    let phone = "2348100000000";

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.handle_event(phone, &InboundEvent::text("hi")).await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            applied += 1;
        }
    }

    // Every applied write bumped the version exactly once; losers that
    // exhausted their retry surfaced ConcurrentStateConflict instead of
    // writing divergent state.
    let record = store.load(phone).await.unwrap();
    assert!(applied >= 1);
    assert_eq!(record.version, i64::from(applied));
    assert_eq!(record.state, ConversationState::AwaitingPlanSelection);
}
