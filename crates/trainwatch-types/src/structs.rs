//! Core data structs: coordinates, feed records, history points, and the
//! stop/report projections produced by history analysis.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::EntityId;

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Coordinate {
    /// Latitude in degrees, `[-90, 90]`.
    pub lat: f64,
    /// Longitude in degrees, `[-180, 180]`.
    pub lng: f64,
}

impl Coordinate {
    /// Create a coordinate from latitude and longitude in degrees.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Return `true` if both components are finite and within the
    /// latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

// ---------------------------------------------------------------------------
// Feed records
// ---------------------------------------------------------------------------

/// One normalized position update from the streaming feed.
///
/// The wire format is loose (`train_id` or `id`, `lon` or `lng`, ...); the
/// transport codec normalizes it into this shape and drops records that lack
/// an id or numeric coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PositionUpdate {
    /// Entity the update belongs to.
    pub entity_id: EntityId,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Server-reported speed in km/h, if any.
    pub speed_kmh: Option<f64>,
    /// Sample time in milliseconds since the Unix epoch, if reported.
    pub timestamp_ms: Option<i64>,
    /// Optional popup/label text supplied by the feed.
    pub label: Option<String>,
}

impl PositionUpdate {
    /// Build an update carrying only the mandatory fields.
    pub fn new(entity_id: impl Into<EntityId>, lat: f64, lng: f64) -> Self {
        Self {
            entity_id: entity_id.into(),
            lat,
            lng,
            speed_kmh: None,
            timestamp_ms: None,
            label: None,
        }
    }

    /// Attach a reported speed.
    #[must_use]
    pub fn with_speed(mut self, speed_kmh: f64) -> Self {
        self.speed_kmh = Some(speed_kmh);
        self
    }

    /// Attach a sample timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    /// Attach a label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The update's position as a [`Coordinate`].
    pub const fn position(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One point of a historical track as served by the history endpoint.
///
/// Wire shape: `{ lat, lng, timestamp, speed? }` with `timestamp` in
/// milliseconds. Points arrive ordered ascending by timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HistoryPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Sample time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Reported speed in km/h, if any.
    #[serde(default)]
    pub speed: Option<f64>,
}

impl HistoryPoint {
    /// The point's position as a [`Coordinate`].
    pub const fn position(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// A contiguous stretch of a historical track judged stationary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StopInterval {
    /// Latitude of the stop location.
    pub lat: f64,
    /// Longitude of the stop location.
    pub lng: f64,
    /// Timestamp (ms) of the first point of the dwell window.
    pub from_timestamp_ms: i64,
    /// Timestamp (ms) of the point that completed the dwell.
    pub to_timestamp_ms: i64,
}

impl StopInterval {
    /// Dwell duration in milliseconds.
    pub const fn duration_ms(&self) -> i64 {
        self.to_timestamp_ms.saturating_sub(self.from_timestamp_ms)
    }
}

/// A stop prepared for drawing: location, interval, and popup text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StopMarker {
    /// Latitude of the marker.
    pub lat: f64,
    /// Longitude of the marker.
    pub lng: f64,
    /// Start of the stop interval (ms).
    pub from_ms: i64,
    /// End of the stop interval (ms).
    pub to_ms: i64,
    /// Human-readable popup text with both timestamps.
    pub popup: String,
}

/// The full result of a historical query, ready for the map collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HistoryReport {
    /// The entity the history was requested for.
    pub train_id: EntityId,
    /// The track as a polyline, oldest first.
    pub points: Vec<Coordinate>,
    /// Detected stops in chronological order.
    pub stops: Vec<StopMarker>,
    /// The final detected stop, highlighted as the last significant halt.
    pub last_halt: Option<StopMarker>,
    /// Status line for the UI.
    pub info: String,
}

// ---------------------------------------------------------------------------
// Live entity projection
// ---------------------------------------------------------------------------

/// Read-only projection of one live entity, served for the selection panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EntityDetails {
    /// Entity identifier.
    pub id: EntityId,
    /// Last rendered (possibly interpolated) position.
    pub current_position: Coordinate,
    /// Last received position.
    pub target_position: Coordinate,
    /// Reported or derived speed in km/h.
    pub speed_kmh: Option<f64>,
    /// First position ever observed for this entity.
    pub start_location: Coordinate,
    /// Label supplied by the feed, if any.
    pub label: Option<String>,
    /// Number of points in the trail.
    pub trail_len: u32,
    /// Wall-clock time (ms) the entity was last updated.
    pub last_seen_ms: i64,
}
