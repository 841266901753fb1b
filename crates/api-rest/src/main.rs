//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging when you only want the REST server (with OpenAPI/Swagger
//! UI). The workspace's main `sickbay-run` binary also loads `.env` files before serving.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use sickbay_core::{CoreConfig, JsonFileStore};

/// Main entry point for the Sickbay REST API server
///
/// # Environment Variables
/// - `SICKBAY_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `SICKBAY_DATA_DIR`: Directory holding the JSON collections (default: "sickbay_data")
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the data directory does not exist or the initial incident load fails,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = CoreConfig::from_env_values(
        std::env::var("SICKBAY_DATA_DIR").ok(),
        std::env::var("SICKBAY_REST_ADDR").ok(),
    )?;
    cfg.ensure_data_dir()?;

    tracing::info!("-- Starting Sickbay REST API on {}", cfg.rest_addr());

    let state = AppState::new(Arc::new(JsonFileStore::new(cfg.data_dir())));
    state.incidents().refresh()?;

    let listener = tokio::net::TcpListener::bind(cfg.rest_addr()).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
