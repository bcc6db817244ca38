//! Web API module for Dataplug
//!
//! Provides:
//! - Webhooks for the messaging and payment providers
//! - Health endpoints

pub mod health;
pub mod webhooks;

use axum::Router;

pub use health::health_routes;
pub use webhooks::webhooks_routes;

/// Create the API router with all endpoints
pub fn api_router() -> Router {
    Router::new().merge(health_routes()).merge(webhooks_routes())
}
