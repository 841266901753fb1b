use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use sickbay_core::{CoreConfig, JsonFileStore};

/// Main entry point for the Sickbay application
///
/// Loads `.env`, resolves configuration once, loads the incident collection and serves the REST
/// API with OpenAPI/Swagger documentation.
///
/// # Environment Variables
/// - `SICKBAY_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `SICKBAY_DATA_DIR`: Directory holding the JSON collections (default: "sickbay_data")
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sickbay=info".parse()?)
                .add_directive("sickbay_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = CoreConfig::from_env_values(
        std::env::var("SICKBAY_DATA_DIR").ok(),
        std::env::var("SICKBAY_REST_ADDR").ok(),
    )?;
    cfg.ensure_data_dir()?;

    tracing::info!("++ Starting REST server on {}", cfg.rest_addr());

    let state = AppState::new(Arc::new(JsonFileStore::new(cfg.data_dir())));
    let loaded = state.incidents().refresh()?;
    tracing::info!("Loaded {} incidents from {}", loaded, cfg.data_dir().display());

    let listener = tokio::net::TcpListener::bind(cfg.rest_addr()).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
