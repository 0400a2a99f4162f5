/// Server setup and initialization
///
/// Wires together all components: store, email sender, scheduler, workflow
/// service and HTTP routes.

use crate::{
    api::{create_contact_routes, create_workflow_routes, AppState},
    config::Config,
    email::sender_from_config,
    runtime::Scheduler,
    store::{SqliteStore, Store},
    workflow::WorkflowService,
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create the HTTP router over an already assembled application state
pub fn create_app(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/healthz", get(health_check))
        // Workflow management API routes
        .merge(create_workflow_routes())
        // Contact registration
        .merge(create_contact_routes())
        .with_state(state)
}

/// Start the scheduler and the HTTP server with the given configuration
///
/// Runs until ctrl-c, then stops the scheduler after the server has drained.
pub async fn start_server(config: Config) -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Upflo server...");

    tracing::info!("🗃️ Opening database at {}", config.database.path);
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&config.database.path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?,
    );

    tracing::info!("✉️ Initializing email sender");
    let sender = sender_from_config(&config.email)?;

    tracing::info!("⏰ Initializing workflow email scheduler");
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store),
        sender,
        config.scheduler.clone(),
    ));
    let handle = scheduler.start().await?;

    let state = AppState {
        service: WorkflowService::new(store),
    };

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = create_app(state);

    // Bind to the configured address
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    handle.stop().await?;
    served?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("🛑 Shutdown signal received");
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
