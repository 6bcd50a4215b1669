//! Shared type definitions for the Trainwatch tracker.
//!
//! This crate is the single source of truth for the records that cross
//! component boundaries: feed updates coming in, history points coming back
//! from the history endpoint, and render events going out to the map.
//! Types flow downstream to `TypeScript` via `ts-rs` for the map front end.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe string wrappers for entity identifiers
//! - [`enums`] -- Connection status
//! - [`structs`] -- Coordinates, feed records, history and stop projections
//! - [`events`] -- Render events for the map collaborator

pub mod enums;
pub mod events;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::ConnectionStatus;
pub use events::RenderEvent;
pub use ids::EntityId;
pub use structs::{
    Coordinate, EntityDetails, HistoryPoint, HistoryReport, PositionUpdate, StopInterval,
    StopMarker,
};
