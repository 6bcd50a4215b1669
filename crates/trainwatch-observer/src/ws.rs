//! `WebSocket` handler for real-time render event streaming.
//!
//! Clients connect to `GET /ws/render` and first receive the current
//! connection status and a `Created` event for every live entity. After
//! that they receive a JSON-encoded [`RenderEvent`] for every marker
//! creation, update, animation frame, and removal.
//!
//! Each connection remembers which markers it has announced. An update
//! for a marker the client never saw is sent as a `Created`, and a frame
//! or removal for one is dropped. If a client falls behind the broadcast
//! buffer it is resynced from the snapshot: every announced marker that
//! is no longer live is removed, and every live one is re-created.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use trainwatch_types::{EntityId, RenderEvent};

use crate::state::{AppState, TrackerSnapshot};

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming render events.
///
/// # Route
///
/// `GET /ws/render`
pub async fn ws_render(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Markers one client has been told about.
#[derive(Debug, Default)]
struct ClientView {
    known: BTreeSet<EntityId>,
}

impl ClientView {
    /// Filter `event` against what the client has seen, recording the
    /// markers it creates and removes.
    fn admit(&mut self, event: RenderEvent) -> Option<RenderEvent> {
        match event {
            RenderEvent::Created { ref id, .. } => {
                self.known.insert(id.clone());
                Some(event)
            }
            RenderEvent::Updated {
                id,
                position,
                speed_kmh,
                trail,
                label,
                target,
            } => {
                if self.known.contains(&id) {
                    Some(RenderEvent::Updated {
                        id,
                        position,
                        target,
                        speed_kmh,
                        trail,
                        label,
                    })
                } else {
                    self.known.insert(id.clone());
                    Some(RenderEvent::Created {
                        id,
                        position,
                        trail,
                        label,
                        speed_kmh,
                    })
                }
            }
            RenderEvent::Moved { ref id, .. } => self.known.contains(id).then_some(event),
            RenderEvent::Removed { ref id } => self.known.remove(id).then_some(event),
            RenderEvent::Status { .. } => Some(event),
        }
    }

    /// Events that bring the client in line with `snapshot`.
    fn resync(&mut self, snapshot: &TrackerSnapshot) -> Vec<RenderEvent> {
        let gone: Vec<EntityId> = self
            .known
            .iter()
            .filter(|id| !snapshot.entities.contains_key(*id))
            .cloned()
            .collect();
        let mut events: Vec<RenderEvent> = gone
            .into_iter()
            .filter_map(|id| self.admit(RenderEvent::Removed { id }))
            .collect();
        events.extend(
            snapshot
                .created_events()
                .into_iter()
                .filter_map(|event| self.admit(event)),
        );
        events
    }
}

async fn send_event(socket: &mut WebSocket, event: &RenderEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize render event: {e}");
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

async fn send_all(socket: &mut WebSocket, events: &[RenderEvent]) -> bool {
    for event in events {
        if !send_event(socket, event).await {
            return false;
        }
    }
    true
}

/// Handle the `WebSocket` lifecycle: subscribe to the broadcast channel
/// and forward each render event as a text frame.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("Render client connected");

    // Subscribe under the snapshot lock: the engine broadcasts while it
    // holds the write lock, so no tick falls between the two.
    let mut view = ClientView::default();
    let (mut rx, opening) = {
        let snapshot = state.snapshot.read().await;
        let status = RenderEvent::Status {
            status: snapshot.connection,
        };
        let mut opening = vec![status];
        opening.extend(view.resync(&snapshot));
        (state.subscribe(), opening)
    };
    if !send_all(&mut socket, &opening).await {
        debug!("Render client disconnected before the first event");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let Some(event) = view.admit(event) else {
                            continue;
                        };
                        if !send_event(&mut socket, &event).await {
                            debug!("Render client disconnected (send failed)");
                            return;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        let events = view.resync(&*state.snapshot.read().await);
                        debug!(skipped = n, resync = events.len(), "Render client lagged, resyncing");
                        if !send_all(&mut socket, &events).await {
                            debug!("Render client disconnected (resync failed)");
                            return;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Broadcast channel closed, shutting down render stream");
                        return;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Render client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("Render client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("Render socket error: {e}");
                        return;
                    }
                    _ => {
                        // The stream is one-way; client text and binary are ignored.
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use trainwatch_types::{Coordinate, EntityDetails};

    use super::*;

    fn moved(id: &str) -> RenderEvent {
        RenderEvent::Moved {
            id: EntityId::from(id),
            position: Coordinate::new(1.0, 1.0),
        }
    }

    fn snapshot_with(ids: &[&str]) -> TrackerSnapshot {
        let mut snapshot = TrackerSnapshot::default();
        for id in ids {
            let at = Coordinate::new(10.0, 77.0);
            snapshot.entities.insert(
                EntityId::from(*id),
                EntityDetails {
                    id: EntityId::from(*id),
                    current_position: at,
                    target_position: at,
                    speed_kmh: None,
                    start_location: at,
                    label: None,
                    trail_len: 1,
                    last_seen_ms: 0,
                },
            );
            snapshot.trails.insert(EntityId::from(*id), vec![at]);
        }
        snapshot
    }

    #[test]
    fn update_for_unseen_marker_becomes_created() {
        let mut view = ClientView::default();
        let update = RenderEvent::Updated {
            id: EntityId::from("a"),
            position: Coordinate::new(1.0, 1.0),
            target: Coordinate::new(2.0, 2.0),
            speed_kmh: Some(50.0),
            trail: vec![Coordinate::new(1.0, 1.0), Coordinate::new(2.0, 2.0)],
            label: None,
        };

        let first = view.admit(update.clone()).unwrap();
        assert!(matches!(first, RenderEvent::Created { ref trail, .. } if trail.len() == 2));
        assert_eq!(view.admit(update.clone()), Some(update));
    }

    #[test]
    fn frames_and_removals_for_unseen_markers_are_dropped() {
        let mut view = ClientView::default();
        assert!(view.admit(moved("ghost")).is_none());
        assert!(
            view.admit(RenderEvent::Removed {
                id: EntityId::from("ghost")
            })
            .is_none()
        );
    }

    #[test]
    fn resync_removes_gone_markers_and_recreates_live_ones() {
        let mut view = ClientView::default();
        let opening = view.resync(&snapshot_with(&["a", "b"]));
        assert_eq!(opening.len(), 2);

        let events = view.resync(&snapshot_with(&["b", "c"]));
        assert_eq!(
            events.first(),
            Some(&RenderEvent::Removed {
                id: EntityId::from("a")
            })
        );
        let created: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, RenderEvent::Created { .. }))
            .filter_map(RenderEvent::entity_id)
            .map(EntityId::as_str)
            .collect();
        assert_eq!(created, vec!["b", "c"]);
        assert!(view.admit(moved("a")).is_none());
        assert!(view.admit(moved("c")).is_some());
    }
}
