//! REST API endpoint handlers for the rendering surface.
//!
//! Reads are served from the [`TrackerSnapshot`](crate::state::TrackerSnapshot);
//! writes are queued on the engine control and applied at the next tick.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/status` | Connection status, tick, entity count |
//! | `GET` | `/api/trains` | Live entity ids (`?q=` substring search) |
//! | `GET` | `/api/trains/{id}` | Entity details with place names |
//! | `POST` | `/api/select/{id}` | Select an entity |
//! | `DELETE` | `/api/select` | Clear the selection |
//! | `POST` | `/api/viewport/reset` | Cancel running animations |
//! | `GET` | `/api/history` | Historical track with detected stops |
//! | `GET` | `/api/place` | Place name for a coordinate |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Local;
use tracing::debug;
use trainwatch_core::control::ControlRequest;
use trainwatch_http::HistoryQuery;
use trainwatch_types::{Coordinate, EntityId};

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameter and response structs
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/trains`.
#[derive(Debug, serde::Deserialize)]
pub struct TrainsQuery {
    /// Case-insensitive substring filter.
    pub q: Option<String>,
}

/// Query parameters for `POST /api/viewport/reset`.
#[derive(Debug, serde::Deserialize)]
pub struct ResetQuery {
    /// Snap interrupted markers to their targets (default `true`).
    pub snap: Option<bool>,
}

/// Query parameters for `GET /api/history`.
#[derive(Debug, serde::Deserialize)]
pub struct HistoryParams {
    /// Entity whose track is requested.
    pub train_id: Option<String>,
    /// Lower time bound (ISO-8601, local time unless an offset is given).
    pub from: Option<String>,
    /// Upper time bound.
    pub to: Option<String>,
}

/// Acknowledgement for queued control requests.
#[derive(Debug, serde::Serialize)]
struct ControlResponse {
    /// Whether the request was queued.
    ok: bool,
    /// Human-readable message.
    message: String,
}

fn accepted(message: String) -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(ControlResponse { ok: true, message }))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Feed connection status and loop progress.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(serde_json::json!({
        "connection": snapshot.connection,
        "tick": snapshot.tick,
        "entities": snapshot.entities.len(),
        "selected": snapshot.selected,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/trains
// ---------------------------------------------------------------------------

/// List live entity ids in sorted order.
///
/// # Query Parameters
///
/// - `q`: substring filter; when present at most 10 ids are returned
pub async fn list_trains(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrainsQuery>,
) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    let trains = match params.q.as_deref() {
        Some(q) => snapshot.search(q),
        None => snapshot.entities.keys().cloned().collect(),
    };
    Json(serde_json::json!({
        "count": trains.len(),
        "trains": trains,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/trains/{id}
// ---------------------------------------------------------------------------

/// Details of one live entity, plus place names for its start and current
/// positions when a geocoder is configured.
pub async fn get_train(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = EntityId::new(id);
    // Release the snapshot lock before any network lookup.
    let details = state
        .snapshot
        .read()
        .await
        .entities
        .get(&id)
        .cloned()
        .ok_or_else(|| ObserverError::NotFound(format!("train {id}")))?;

    let (start_place, current_place) = match state.geocoder.as_deref() {
        Some(geocoder) => (
            geocoder.place_name(details.start_location).await,
            geocoder.place_name(details.current_position).await,
        ),
        None => (None, None),
    };

    let mut body = serde_json::to_value(&details)?;
    if let Some(object) = body.as_object_mut() {
        object.insert("start_place".to_owned(), serde_json::json!(start_place));
        object.insert("current_place".to_owned(), serde_json::json!(current_place));
        object.insert(
            "selected".to_owned(),
            serde_json::json!(state.snapshot.read().await.selected.as_ref() == Some(&id)),
        );
    }
    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// Selection and viewport control
// ---------------------------------------------------------------------------

/// Select a live entity. Applied at the next tick.
pub async fn select_train(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = EntityId::new(id);
    if !state.snapshot.read().await.entities.contains_key(&id) {
        return Err(ObserverError::NotFound(format!("train {id}")));
    }
    state.control.submit(ControlRequest::Select(id.clone())).await;
    Ok(accepted(format!("Selecting train {id}")))
}

/// Clear the selection. Applied at the next tick.
pub async fn clear_selection(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.control.submit(ControlRequest::ClearSelection).await;
    accepted(String::from("Selection cleared"))
}

/// Cancel every running animation, snapping markers to their targets
/// unless `?snap=false`.
pub async fn reset_viewport(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResetQuery>,
) -> impl IntoResponse {
    let snap_to_target = params.snap.unwrap_or(true);
    state
        .control
        .submit(ControlRequest::ResetViewport { snap_to_target })
        .await;
    accepted(format!("Viewport reset queued (snap: {snap_to_target})"))
}

// ---------------------------------------------------------------------------
// GET /api/history
// ---------------------------------------------------------------------------

/// Fetch a historical track and annotate it with detected stops.
///
/// Naive `from`/`to` values are read in the server's local time zone.
/// Bad parameters are a 400; an unreachable or failing history endpoint
/// is a 502.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ObserverError> {
    let query = HistoryQuery::from_params(
        params.train_id.as_deref(),
        params.from.as_deref(),
        params.to.as_deref(),
        &Local,
    )?;
    let client = state
        .history
        .as_ref()
        .ok_or_else(|| ObserverError::Unavailable("history endpoint not configured".to_owned()))?;

    let report = client.report(&query, &state.stop_thresholds, &Local).await?;
    debug!(
        train = %report.train_id,
        points = report.points.len(),
        stops = report.stops.len(),
        "History report served"
    );
    Ok(Json(report))
}

/// Place name for an arbitrary coordinate; used by the history panel's
/// "last halt" line.
pub async fn get_place(
    State(state): State<Arc<AppState>>,
    Query(at): Query<Coordinate>,
) -> Result<impl IntoResponse, ObserverError> {
    let geocoder = state
        .geocoder
        .as_deref()
        .ok_or_else(|| ObserverError::Unavailable("geocoding disabled".to_owned()))?;
    let place = geocoder.place_name(at).await;
    Ok(Json(serde_json::json!({
        "lat": at.lat,
        "lng": at.lng,
        "place": place,
    })))
}
