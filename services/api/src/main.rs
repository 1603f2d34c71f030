use anyhow::Context;
use punchout_api::config::Config;
use punchout_api::{AppState, cors_layer, router};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    info!("Configuration loaded successfully. Starting punch-out API...");
    config.warn_missing_credentials();

    let state = AppState::from_config(&config).context("Failed to build provider clients")?;
    let cors = cors_layer(&config.cors_origin).context("Invalid CORS_ORIGIN")?;
    let app = router(state).layer(cors);

    info!("Listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    axum::serve(listener, app).await?;

    Ok(())
}
