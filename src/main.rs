// src/main.rs
use box_stacking::api;
use box_stacking::config::AppConfig;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env first so RUST_LOG from it reaches the subscriber.
    let dotenv_result = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    let simulation = app_config.simulation.clone();
    let container = simulation.container_config();
    info!(
        width = container.width,
        height = container.height,
        penalty_multiplier = container.penalty_multiplier,
        height_bias = simulation.height_bias(),
        "Box stacking service starting"
    );

    if let Err(err) = api::start_api_server(app_config.api, simulation).await {
        error!("Could not run API server: {}", err);
        std::process::exit(1);
    }
}
