//! Tracker binary for Trainwatch.
//!
//! This is the main entry point that wires together the feed transport,
//! the reconciliation loop, the HTTP collaborators, and the rendering
//! surface. It runs until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `trainwatch-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the HTTP collaborators (history client, geocoder)
//! 4. Start the rendering surface
//! 5. Open the feed connection and forward its status
//! 6. Run the reconciliation loop until a stop is requested
//! 7. Close the feed and wait for the surface to drain

mod error;
mod observer_callback;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trainwatch_core::clock::SystemClock;
use trainwatch_core::config::{EngineSettings, TrackerConfig};
use trainwatch_core::control::EngineControl;
use trainwatch_core::runner::{self, LoopTiming};
use trainwatch_core::tick::ReconciliationEngine;
use trainwatch_http::{CachedGeocoder, HistoryClient, NominatimGeocoder};
use trainwatch_observer::state::AppState;
use trainwatch_transport::{TransportChannel, TransportHandle};
use trainwatch_types::PositionUpdate;

use crate::error::EngineError;
use crate::observer_callback::ObserverCallback;

/// Application entry point for the tracker.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the rendering surface
/// cannot start. Feed failures are retried forever and never end the
/// process.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = TrackerConfig::load().map_err(EngineError::from)?;

    // 2. Initialize structured logging. RUST_LOG wins over the config level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str())),
        )
        .with_target(true)
        .init();

    info!(
        feed_url = %config.feed.url,
        history_url = %config.history.base_url,
        geocoding = config.geocoding.enabled,
        tick_interval_ms = config.reconciliation.tick_interval_ms,
        stale_after_ms = config.reconciliation.stale_after_ms,
        "trainwatch-engine starting"
    );

    // 3. HTTP collaborators.
    let control = Arc::new(EngineControl::new());
    let mut app_state = AppState::new(Arc::clone(&control))
        .with_stop_thresholds(config.stops)
        .with_history(HistoryClient::new(&config.history).map_err(EngineError::from)?);
    if config.geocoding.enabled {
        let nominatim = NominatimGeocoder::new(&config.geocoding).map_err(EngineError::from)?;
        app_state = app_state.with_geocoder(CachedGeocoder::new(nominatim, &config.geocoding));
    }
    let app_state = Arc::new(app_state);

    // 4. Rendering surface.
    let observer_handle = trainwatch_observer::spawn_observer(&config.observer, Arc::clone(&app_state))
        .await
        .map_err(EngineError::from)?;
    info!(port = config.observer.port, "Observer API server started");

    // 5. Feed connection; its status is mirrored onto the surface.
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PositionUpdate>>();
    let transport = TransportChannel::connect(config.feed.clone(), tx);
    let status_task = spawn_status_forwarder(&transport, Arc::clone(&app_state));

    // Ctrl-C stops the loop; the feed is closed once the loop returns.
    {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => warn!(error = %e, "Failed to listen for shutdown signal; stopping"),
            }
            control.request_stop();
        });
    }

    // 6. Reconciliation loop.
    let mut engine = ReconciliationEngine::new(EngineSettings::from_config(&config));
    let mut callback = ObserverCallback::new(Arc::clone(&app_state));
    let result = runner::run_reconciliation(
        &mut engine,
        &mut rx,
        &control,
        &SystemClock,
        LoopTiming::from_config(&config.reconciliation),
        &mut callback,
    )
    .await;

    // 7. Teardown.
    transport.close();
    transport.join().await;
    status_task.abort();
    if let Err(e) = observer_handle.await {
        warn!(error = %e, "Observer task ended abnormally");
    }

    info!(
        total_ticks = result.total_ticks,
        live_entities = result.live_entities,
        "trainwatch-engine shutdown complete"
    );

    Ok(())
}

/// Mirror transport state changes onto the rendering surface.
fn spawn_status_forwarder(transport: &TransportHandle, state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let mut states = transport.subscribe();
    tokio::spawn(async move {
        let mut last = None;
        loop {
            let status = states.borrow_and_update().status();
            if last != Some(status) {
                info!(?status, "Feed status changed");
                state.set_connection(status).await;
                last = Some(status);
            }
            if states.changed().await.is_err() {
                break;
            }
        }
    })
}
