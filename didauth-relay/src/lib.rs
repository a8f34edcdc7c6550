//! didauth-relay
//!
//! HTTP relay for DID sign-in. A browser asks for an authorization request,
//! shows it to the holder's wallet, and polls for the outcome while the wallet
//! posts its zero-knowledge response to the callback URL.

use std::{future::Future, sync::Arc};

use anyhow::Context;
use axum::{
    extract::State,
    http::HeaderName,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

use didauth_verifier::{AuthVerifier, RemoteVerifier, UnconfiguredVerifier, VerificationError};

pub mod callback;
pub mod config;
pub mod error;
pub mod issuer;
pub mod session;
pub mod status;

pub use config::{ConfigError, RelayConfig};
pub use error::ApiError;
pub use session::{SessionId, SessionStatus, SessionStore};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    config: Arc<RelayConfig>,
    sessions: SessionStore,
    verifier: Arc<dyn AuthVerifier>,
}

impl AppState {
    /// Build the state, reaching the verification service at
    /// `config.verifier_url` when one is configured.
    pub fn from_config(config: RelayConfig) -> Result<Self, VerificationError> {
        let verifier: Arc<dyn AuthVerifier> = match &config.verifier_url {
            Some(url) => {
                let remote = RemoteVerifier::new(url.clone(), config.verify_timeout)?;
                info!(endpoint = %remote.endpoint(), "using remote verification service");
                Arc::new(remote)
            }
            None => Arc::new(UnconfiguredVerifier),
        };
        Ok(Self::with_components(config, verifier))
    }

    pub fn with_components(config: RelayConfig, verifier: Arc<dyn AuthVerifier>) -> Self {
        let sessions = SessionStore::new(config.session_ttl, config.resolved_session_ttl);
        Self {
            config: Arc::new(config),
            sessions,
            verifier,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

pub fn app_router(state: AppState) -> Router {
    let config = state.config.clone();

    let router = Router::new()
        .route("/health", get(health))
        .route("/api/sign-in", get(issuer::sign_in).post(issuer::sign_in))
        .route(&config.callback_path, post(callback::callback))
        .route("/api/status", get(status::status))
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(TraceLayer::new_for_http());

    let router = if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([HeaderName::from_static(issuer::SESSION_ID_HEADER)]);
        router.layer(cors)
    } else {
        router
    };

    router.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    active_sessions: usize,
    verifier_configured: bool,
    version: &'static str,
}

async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let active_sessions = state.sessions.len()?;
    Ok(Json(HealthResponse {
        status: "ok",
        active_sessions,
        verifier_configured: state.config.verifier_url.is_some(),
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Bind the configured address and serve until `shutdown` resolves. Expired
/// sessions are purged in the background for the lifetime of the server.
pub async fn serve<F>(state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let janitor = session::spawn_janitor(state.sessions.clone(), state.config.purge_interval);

    let listener = TcpListener::bind(&state.config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", state.config.listen_addr))?;
    info!(
        addr = %listener.local_addr()?,
        callback = %state.config.callback_endpoint,
        verifier_configured = state.config.verifier_url.is_some(),
        "didauth relay listening"
    );

    let result = axum::serve(listener, app_router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error");

    janitor.abort();
    result
}
