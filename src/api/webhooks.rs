//! Webhook handlers for the messaging and payment providers

use crate::dispatch::Dispatcher;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use dataplug_channels::{WhatsAppBusinessAdapter, WhatsAppBusinessWebhook};
use dataplug_core::{Error, SettlementOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// WhatsApp Business webhook verification query
#[derive(Debug, Deserialize)]
pub struct WebhookVerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Verify WhatsApp Business webhook (GET)
///
/// Meta sends this request during webhook setup to verify ownership.
async fn whatsapp_verify(
    Query(query): Query<WebhookVerifyQuery>,
    Extension(adapter): Extension<Arc<WhatsAppBusinessAdapter>>,
) -> impl IntoResponse {
    let mode = query.mode.as_deref().unwrap_or("");
    let token = query.verify_token.as_deref().unwrap_or("");
    let challenge = query.challenge.as_deref().unwrap_or("");

    match adapter.verify_webhook(mode, token, challenge) {
        Some(c) => {
            info!("WhatsApp webhook verified");
            c.into_response()
        }
        None => {
            warn!("WhatsApp webhook verification failed");
            (StatusCode::FORBIDDEN, "Verification failed").into_response()
        }
    }
}

/// Handle WhatsApp Business webhook (POST)
///
/// Receives incoming messages and status updates from Meta. Returns 200
/// for everything except persistence unavailability, where a 5xx makes
/// the provider redeliver.
async fn whatsapp_webhook(
    Extension(adapter): Extension<Arc<WhatsAppBusinessAdapter>>,
    Extension(dispatcher): Extension<Arc<Dispatcher>>,
    Json(payload): Json<WhatsAppBusinessWebhook>,
) -> StatusCode {
    for msg in adapter.extract_messages(&payload) {
        match dispatcher.process_message(&msg).await {
            Ok(()) => {}
            Err(e @ Error::PersistenceUnavailable(_)) => {
                error!(error = %e, "persistence unavailable, requesting redelivery");
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
            Err(e) => {
                error!(error = %e, from = %msg.from, "failed to process webhook message");
            }
        }
    }
    StatusCode::OK
}

/// Payment provider settlement callback body
#[derive(Debug, Deserialize)]
pub struct PaymentCallback {
    /// Payment reference generated at initiate time
    pub reference: String,
    /// Terminal outcome reported by the provider
    pub outcome: SettlementOutcome,
}

/// Settlement response
#[derive(Debug, Serialize)]
pub struct PaymentCallbackResponse {
    pub reference: String,
    pub status: String,
}

/// Handle payment provider settlement callback (POST)
async fn payment_webhook(
    Extension(dispatcher): Extension<Arc<Dispatcher>>,
    Json(callback): Json<PaymentCallback>,
) -> impl IntoResponse {
    match dispatcher
        .process_settlement(&callback.reference, callback.outcome)
        .await
    {
        Ok(purchase) => (
            StatusCode::OK,
            Json(PaymentCallbackResponse {
                reference: purchase.payment_reference,
                status: purchase.status.to_string(),
            }),
        )
            .into_response(),
        Err(Error::PurchaseNotFound(reference)) => {
            warn!(reference = %reference, "settlement for unknown purchase");
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e @ Error::ConflictingSettlement { .. }) => {
            error!(error = %e, "conflicting settlement rejected");
            StatusCode::CONFLICT.into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to process settlement");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Create webhook routes
pub fn webhooks_routes() -> Router {
    Router::new()
        .route(
            "/api/v1/webhooks/whatsapp",
            get(whatsapp_verify).post(whatsapp_webhook),
        )
        .route("/api/v1/webhooks/payment", post(payment_webhook))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_query_deserialize() {
        let query = "hub.mode=subscribe&hub.verify_token=test&hub.challenge=abc123";
        let parsed: WebhookVerifyQuery = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(parsed.mode.as_deref(), Some("subscribe"));
        assert_eq!(parsed.challenge.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_payment_callback_deserialize() {
        let callback: PaymentCallback = serde_json::from_str(
            r#"{"reference": "DP-abc123", "outcome": "paid"}"#,
        )
        .unwrap();
        assert_eq!(callback.reference, "DP-abc123");
        assert_eq!(callback.outcome, SettlementOutcome::Paid);
    }
}
