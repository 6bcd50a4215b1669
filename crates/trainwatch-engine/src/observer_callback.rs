//! Tick callback that updates the rendering surface state.
//!
//! After each tick this callback refreshes the
//! [`TrackerSnapshot`](trainwatch_observer::TrackerSnapshot) served by
//! the REST endpoints and broadcasts the tick's render events to all
//! connected `WebSocket` clients. Both happen under the snapshot write
//! lock, so a client that subscribes while reading the snapshot sees each
//! tick either in the snapshot or on the stream. Interpolation frames are
//! broadcast only.

use std::sync::Arc;

use tracing::{debug, trace};
use trainwatch_core::runner::TickCallback;
use trainwatch_core::tick::{ReconciliationEngine, TickSummary};
use trainwatch_observer::state::AppState;
use trainwatch_types::RenderEvent;

/// Callback that bridges the reconciliation loop to the rendering surface.
pub struct ObserverCallback {
    state: Arc<AppState>,
    /// Tick events held back while the snapshot was busy.
    pending: Vec<RenderEvent>,
}

impl ObserverCallback {
    /// Create a new observer callback backed by the given app state.
    pub const fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            pending: Vec::new(),
        }
    }
}

impl TickCallback for ObserverCallback {
    fn on_tick(&mut self, summary: &TickSummary, engine: &ReconciliationEngine) {
        self.pending.extend(summary.events.iter().cloned());

        // Use try_write to avoid blocking the loop: if a reader holds the
        // lock, hold this tick's events back; the next tick publishes both.
        let Ok(mut snap) = self.state.snapshot.try_write() else {
            trace!(
                tick = summary.tick,
                deferred = self.pending.len(),
                "Snapshot busy; refresh deferred"
            );
            return;
        };
        snap.refresh(engine);

        if !self.pending.is_empty() {
            let mut receivers = 0_usize;
            for event in &self.pending {
                receivers = receivers.max(self.state.broadcast(event));
            }
            debug!(
                tick = summary.tick,
                events = self.pending.len(),
                receivers,
                "Tick events broadcast"
            );
            self.pending.clear();
        }
        drop(snap);
    }

    fn on_frame(&mut self, events: &[RenderEvent]) {
        // Frames are superseded by later ones; skip them until the held
        // tick events are out.
        if !self.pending.is_empty() {
            return;
        }
        for event in events {
            let _ = self.state.broadcast(event);
        }
    }
}
