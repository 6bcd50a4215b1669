//! Rendering surface for the Trainwatch tracker.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws/render`) streaming every
//!   [`RenderEvent`](trainwatch_types::RenderEvent) the engine produces via
//!   [`tokio::sync::broadcast`]
//! - **REST endpoints** for live entities, their details (with best-effort
//!   place names), and connection status
//! - **Control endpoints** for selection and viewport reset, queued on the
//!   engine's [`EngineControl`](trainwatch_core::control::EngineControl)
//! - **History endpoint** that fetches a historical track and returns it
//!   annotated with detected stops
//!
//! # Architecture
//!
//! The observer reads from an in-memory [`TrackerSnapshot`] that is
//! refreshed after each reconciliation tick. REST reads never touch the
//! entity store, so the observer never blocks the loop. `WebSocket`
//! clients receive events through a broadcast channel with automatic lag
//! handling.
//!
//! [`TrackerSnapshot`]: state::TrackerSnapshot

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use startup::spawn_observer;
pub use state::{AppState, TrackerSnapshot};
