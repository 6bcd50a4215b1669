//! Observer startup helper for embedding in the engine binary.
//!
//! [`spawn_observer`] binds eagerly (so a port clash fails startup rather
//! than a background task) and then serves on a background Tokio task
//! alongside the reconciliation loop.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use trainwatch_core::config::ObserverConfig;

use crate::server::{ServerError, parse_addr, serve};
use crate::state::AppState;

/// Errors that can occur when spawning the observer.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Bind `config.host:config.port` and serve on a background task.
///
/// The server shuts down gracefully once a stop is requested on the
/// engine control held by `state`. The returned handle resolves after
/// that.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the address is invalid or
/// cannot be bound.
pub async fn spawn_observer(
    config: &ObserverConfig,
    state: Arc<AppState>,
) -> Result<JoinHandle<()>, StartupError> {
    let addr = parse_addr(config)?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, state).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(%addr, "Observer server spawned on background task");

    Ok(handle)
}
