//! # convoflowd: convoflow daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Install the `tracing` subscriber
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct the port implementations (adapters) and the engine
//! - Load automations and restore unfinished jobs
//! - Run the queue loops and the schedule scanner
//! - Build the axum router and serve
//! - Handle graceful shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;
mod ports;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use convoflow_adapter_console::PlaceholderRenderer;
use convoflow_adapter_http_axum::state::AppState;
use convoflow_adapter_storage_sqlite_sqlx::Config as DatabaseConfig;
use convoflow_adapter_webhook_reqwest::ReqwestWebhookClient;
use convoflow_app::engine::AutomationEngine;
use convoflow_app::event_bus::InProcessEventBus;
use convoflow_app::registry::AutomationRegistry;

use crate::config::Config;
use crate::ports::AppPorts;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let database = DatabaseConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await
    .context("opening database")?;

    // Ports
    let event_bus = Arc::new(InProcessEventBus::new(256));
    let ports = Arc::new(AppPorts::new(
        &database,
        PlaceholderRenderer::new(config.templates.clone()),
        ReqwestWebhookClient::new().context("building webhook client")?,
        Arc::clone(&event_bus),
    ));

    // Engine
    let engine = AutomationEngine::new(
        ports,
        Arc::new(AutomationRegistry::new()),
        config.engine_config(),
        config.queue_config(),
    );
    engine.start().await.context("starting engine")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = tokio::spawn(Arc::clone(&engine).run(shutdown_rx.clone()));

    // HTTP
    let app = convoflow_adapter_http_axum::router::build(AppState::new(engine, event_bus));
    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(%bind_addr, "convoflowd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("serving http")?;

    workers.await.context("joining engine workers")?;
    tracing::info!("convoflowd stopped");
    Ok(())
}

/// Resolve on Ctrl-C and tell the engine loops to stop.
async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown requested");
    let _ = shutdown.send(true);
}
