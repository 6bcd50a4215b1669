//! Axum router construction for the rendering surface.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for the map front end.

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /ws/render` -- `WebSocket` render event stream
/// - `GET /api/status` -- connection status and loop progress
/// - `GET /api/trains` -- live entity ids (`?q=` search)
/// - `GET /api/trains/{id}` -- entity details with place names
/// - `POST /api/select/{id}`, `DELETE /api/select` -- selection
/// - `POST /api/viewport/reset` -- cancel running animations
/// - `GET /api/history` -- historical track with stops
/// - `GET /api/place` -- place name for `?lat=&lng=`
///
/// CORS allows any origin; the map front end is served separately.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // WebSocket
        .route("/ws/render", get(ws::ws_render))
        // Live state
        .route("/api/status", get(handlers::get_status))
        .route("/api/trains", get(handlers::list_trains))
        .route("/api/trains/{id}", get(handlers::get_train))
        // Control
        .route("/api/select", delete(handlers::clear_selection))
        .route("/api/select/{id}", post(handlers::select_train))
        .route("/api/viewport/reset", post(handlers::reset_viewport))
        // Collaborators
        .route("/api/history", get(handlers::get_history))
        .route("/api/place", get(handlers::get_place))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
