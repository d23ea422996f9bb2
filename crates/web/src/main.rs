//! `jambuster-web` binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise structured logging.
//! 3. Build the backend API client.
//! 4. Create the session store and manager.
//! 5. Build the Axum router and start the HTTP server.

mod api;
mod config;
mod error;
mod server;
mod session;
mod telemetry;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use api::ApiClient;
use config::Config;
use server::state::AppState;
use session::{MemoryStore, SessionConfig, SessionManager};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Logging is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(&cfg.log_level, &cfg.env)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        env = %cfg.env,
        port = cfg.listen_port,
        backend = %cfg.backend_hostname,
        "jambuster-web starting"
    );

    // -----------------------------------------------------------------------
    // 3. Backend API client
    // -----------------------------------------------------------------------
    let api = ApiClient::new(&cfg.backend_hostname, cfg.api_max_request_time())
        .context("failed to build backend API client")?;

    // -----------------------------------------------------------------------
    // 4. Sessions
    // -----------------------------------------------------------------------
    let sessions = SessionManager::new(
        Arc::new(MemoryStore::new()),
        SessionConfig {
            lifetime: cfg.session_lifetime(),
            cookie_secure: cfg.session_cookie_secure,
            store_timeout: cfg.session_store_timeout(),
        },
    );

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(Arc::new(api), sessions);
    let router = server::router::build(state);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
