//! Server startup and wiring
//!
//! Constructs the store, engine, pipeline and adapter once at startup
//! and injects them into the routers as extensions. No connection
//! singletons: every component receives its handle explicitly.

use crate::api;
use crate::cli::Cli;
use crate::dispatch::Dispatcher;
use anyhow::Result;
use axum::Extension;
use dataplug_channels::WhatsAppBusinessAdapter;
use dataplug_core::{AuditSink, CallbackProvider, Engine, PurchasePipeline, SqliteStore};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Run the server until shutdown
pub async fn run(cli: Cli) -> Result<()> {
    let store = Arc::new(SqliteStore::new(&cli.db_path).await?);
    let audit = AuditSink::new(store.clone());

    let engine = Arc::new(Engine::new(store.clone(), audit.clone()));
    let pipeline = Arc::new(PurchasePipeline::new(
        store.clone(),
        Arc::new(CallbackProvider),
        audit.clone(),
    ));
    let adapter = Arc::new(WhatsAppBusinessAdapter::from_env()?);
    let dispatcher = Arc::new(Dispatcher::new(
        engine,
        pipeline,
        adapter.clone(),
        audit,
    ));

    let app = api::api_router()
        .layer(Extension(store))
        .layer(Extension(adapter))
        .layer(Extension(dispatcher))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port)).await?;
    info!(port = cli.port, db = %cli.db_path.display(), "Dataplug listening");
    axum::serve(listener, app).await?;

    Ok(())
}
