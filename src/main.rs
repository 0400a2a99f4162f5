/// Upflo: workflow-driven email scheduling
///
/// Main entry point for the Upflo server. Loads configuration from the
/// environment, starts the email scheduler and serves the HTTP API.

use upflo::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Workflow management API at /api/workflows/*
/// - Contact registration at /api/contacts and unsubscribe at /api/unsubscribe
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (defaults to 0.0.0.0:3004 and data/upflo.db)
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
