//! Shared application state for the rendering surface.
//!
//! [`AppState`] holds the broadcast channel for render events, the
//! read-only [`TrackerSnapshot`] the REST endpoints serve, the engine's
//! control handle, and the optional HTTP collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use trainwatch_core::control::EngineControl;
use trainwatch_core::tick::{ReconciliationEngine, search_ids};
use trainwatch_geo::StopThresholds;
use trainwatch_http::{CachedGeocoder, HistoryClient, NominatimGeocoder};
use trainwatch_types::{ConnectionStatus, Coordinate, EntityDetails, EntityId, RenderEvent};

/// Capacity of the broadcast channel for render events.
///
/// If a subscriber falls behind by more than this many messages it will
/// receive a [`broadcast::error::RecvError::Lagged`]; the render stream
/// then resyncs that client from the snapshot.
const BROADCAST_CAPACITY: usize = 256;

/// The geocoder type the surface uses for place names.
pub type PlaceGeocoder = CachedGeocoder<NominatimGeocoder>;

/// In-memory read model served by the REST endpoints.
///
/// Refreshed after each tick by the engine. All reads are served from
/// this snapshot so the surface never blocks the reconciliation loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerSnapshot {
    /// Last completed tick.
    pub tick: u64,
    /// Feed connection status.
    pub connection: ConnectionStatus,
    /// Live entities keyed by id.
    pub entities: BTreeMap<EntityId, EntityDetails>,
    /// Trail of each live entity, oldest point first.
    pub trails: BTreeMap<EntityId, Vec<Coordinate>>,
    /// Currently selected entity, if any.
    pub selected: Option<EntityId>,
}

impl TrackerSnapshot {
    /// Copy the engine's current read model. The connection status is
    /// tracked separately and left untouched.
    pub fn refresh(&mut self, engine: &ReconciliationEngine) {
        self.tick = engine.tick_count();
        self.entities = engine
            .store()
            .iter()
            .map(|entity| (entity.id().clone(), entity.details()))
            .collect();
        self.trails = engine
            .store()
            .iter()
            .map(|entity| (entity.id().clone(), entity.trail().to_vec()))
            .collect();
        self.selected = engine.selection().map(|details| details.id);
    }

    /// One [`RenderEvent::Created`] per live entity at its last ticked
    /// position, with its full trail.
    pub fn created_events(&self) -> Vec<RenderEvent> {
        self.entities
            .values()
            .map(|details| RenderEvent::Created {
                id: details.id.clone(),
                position: details.current_position,
                trail: self.trails.get(&details.id).cloned().unwrap_or_default(),
                label: details.label.clone(),
                speed_kmh: details.speed_kmh,
            })
            .collect()
    }

    /// Live entity ids matching `query`, capped like the engine's search.
    pub fn search(&self, query: &str) -> Vec<EntityId> {
        search_ids(self.entities.keys(), query)
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast sender for render events.
    pub tx: broadcast::Sender<RenderEvent>,
    /// The current tracker snapshot (refreshed each tick).
    pub snapshot: Arc<RwLock<TrackerSnapshot>>,
    /// Control handle of the reconciliation loop.
    pub control: Arc<EngineControl>,
    /// History endpoint client, when configured.
    pub history: Option<HistoryClient>,
    /// Reverse geocoder, when enabled.
    pub geocoder: Option<Arc<PlaceGeocoder>>,
    /// Thresholds for stop detection on historical tracks.
    pub stop_thresholds: StopThresholds,
}

impl AppState {
    /// Create a state with an empty snapshot and no HTTP collaborators.
    pub fn new(control: Arc<EngineControl>) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            snapshot: Arc::new(RwLock::new(TrackerSnapshot::default())),
            control,
            history: None,
            geocoder: None,
            stop_thresholds: StopThresholds::default(),
        }
    }

    /// Attach the history client.
    #[must_use]
    pub fn with_history(mut self, client: HistoryClient) -> Self {
        self.history = Some(client);
        self
    }

    /// Attach the reverse geocoder.
    #[must_use]
    pub fn with_geocoder(mut self, geocoder: PlaceGeocoder) -> Self {
        self.geocoder = Some(Arc::new(geocoder));
        self
    }

    /// Use `thresholds` for history stop detection.
    #[must_use]
    pub const fn with_stop_thresholds(mut self, thresholds: StopThresholds) -> Self {
        self.stop_thresholds = thresholds;
        self
    }

    /// Subscribe to the render event channel.
    pub fn subscribe(&self) -> broadcast::Receiver<RenderEvent> {
        self.tx.subscribe()
    }

    /// Publish a render event to all connected clients.
    ///
    /// Returns the number of receivers that received the message.
    /// Returns 0 if no clients are connected (this is not an error).
    pub fn broadcast(&self, event: &RenderEvent) -> usize {
        self.tx.send(event.clone()).unwrap_or(0)
    }

    /// Record a connection status change and tell connected clients.
    pub async fn set_connection(&self, status: ConnectionStatus) {
        self.snapshot.write().await.connection = status;
        let _ = self.broadcast(&RenderEvent::Status { status });
    }
}
