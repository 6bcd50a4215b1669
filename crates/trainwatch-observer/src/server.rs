//! Rendering surface server lifecycle.
//!
//! Provides [`start_server`] which binds to a TCP port and serves the
//! router until the engine control reports a stop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use trainwatch_core::config::ObserverConfig;

use crate::router::build_router;
use crate::state::AppState;

/// Start the rendering surface server.
///
/// Binds to the configured address, builds the router, and serves
/// requests until a stop is requested on `state.control`, then drains
/// in-flight requests and returns.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind or the server
/// encounters a fatal I/O error.
pub async fn start_server(config: &ObserverConfig, state: Arc<AppState>) -> Result<(), ServerError> {
    let addr = parse_addr(config)?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;
    serve(listener, state).await
}

/// Serve on an already bound listener until a stop is requested.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), ServerError> {
    let control = Arc::clone(&state.control);
    let router = build_router(state);

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Observer server listening");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { control.stopped().await })
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))?;

    info!("Observer server stopped");
    Ok(())
}

/// Parse `host:port` from the configuration.
pub fn parse_addr(config: &ObserverConfig) -> Result<SocketAddr, ServerError> {
    format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ServerError::Bind(format!("invalid address: {e}")))
}

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}
