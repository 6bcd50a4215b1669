//! Rendering-surface events.
//!
//! The engine never draws anything itself. Each reconciliation tick and each
//! interpolation frame produces [`RenderEvent`]s describing what an external
//! map collaborator should do with its markers and polylines.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::ConnectionStatus;
use crate::ids::EntityId;
use crate::structs::Coordinate;

/// An instruction for the map-drawing collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RenderEvent {
    /// A previously unseen entity appeared: create its marker and polyline,
    /// replacing any existing marker with the same id.
    Created {
        /// Entity identifier.
        id: EntityId,
        /// Initial marker position.
        position: Coordinate,
        /// Initial trail (a single point).
        trail: Vec<Coordinate>,
        /// Popup label, if the feed supplied one.
        label: Option<String>,
        /// Reported speed in km/h, if any.
        speed_kmh: Option<f64>,
    },
    /// A known entity received a new position.
    Updated {
        /// Entity identifier.
        id: EntityId,
        /// Currently rendered position (the interpolation start).
        position: Coordinate,
        /// Newly received position the marker is moving toward.
        target: Coordinate,
        /// Reported or derived speed in km/h.
        speed_kmh: Option<f64>,
        /// Full trail after the append, oldest first.
        trail: Vec<Coordinate>,
        /// Popup label, if any.
        label: Option<String>,
    },
    /// An interpolation frame moved the rendered position.
    Moved {
        /// Entity identifier.
        id: EntityId,
        /// New rendered position.
        position: Coordinate,
    },
    /// The entity went stale and was evicted: remove marker and polyline.
    Removed {
        /// Entity identifier.
        id: EntityId,
    },
    /// The feed connection status changed.
    Status {
        /// New connection status.
        status: ConnectionStatus,
    },
}

impl RenderEvent {
    /// The entity this event concerns, if any.
    pub const fn entity_id(&self) -> Option<&EntityId> {
        match self {
            Self::Created { id, .. }
            | Self::Updated { id, .. }
            | Self::Moved { id, .. }
            | Self::Removed { id } => Some(id),
            Self::Status { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let ev = RenderEvent::Removed {
            id: EntityId::from("t1"),
        };
        let json: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "removed");
        assert_eq!(json["id"], "t1");

        let status = RenderEvent::Status {
            status: ConnectionStatus::Connected,
        };
        let json: serde_json::Value = serde_json::to_value(&status).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["status"], "connected");
        assert!(status.entity_id().is_none());
    }

    #[test]
    fn moved_event_carries_position() {
        let ev = RenderEvent::Moved {
            id: EntityId::from("t2"),
            position: Coordinate::new(1.5, 2.5),
        };
        let json: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "moved");
        assert_eq!(json["position"]["lat"], 1.5);
        assert_eq!(ev.entity_id().map(EntityId::as_str), Some("t2"));
    }
}
