//! # passkey_gate server
//!
//! Loads configuration, opens the database and serves the passkey
//! authentication API.

use passkey_gate::config::Config;
use passkey_gate::state::AppState;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired pending ceremonies are swept from the database
const CHALLENGE_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,passkey_gate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    let app_state = AppState::new(&config).await?;
    tracing::info!("Application state initialized");

    // Reads already ignore expired rows; this only keeps the table small
    let challenges = app_state.challenges.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CHALLENGE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match challenges.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {} expired ceremonies", n),
                Err(e) => tracing::error!("Challenge cleanup failed: {:?}", e),
            }
        }
    });

    // Permissive for development; production sits behind the storefront gateway
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = passkey_gate::router(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let bind_addr = config.bind_address();
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
