//! didauth-relay
//!
//! HTTP service for DID sign-in.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use didauth_relay::{serve, AppState, RelayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "didauth_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env()?;
    if config.verifier_url.is_none() {
        tracing::warn!("DIDAUTH_VERIFIER_URL is not set; callbacks will answer 502");
    }

    let state = AppState::from_config(config)?;
    serve(state, shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(err) => {
            tracing::error!(error = %err, "failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    }
}
