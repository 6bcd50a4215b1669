//! Inbound frame decoding.
//!
//! The feed is loosely typed JSON: a frame is either a control message, a
//! single record, or an array of records, and records name their fields
//! inconsistently (`train_id` or `id`, `lon` or `lng`). Decoding is
//! tolerant. Bad frames and bad records are dropped, never errors.

use chrono::DateTime;
use serde_json::Value;
use trainwatch_types::{EntityId, PositionUpdate};

/// Outbound liveness probe.
pub const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// Liveness-only message types. Consumed, never forwarded.
const CONTROL_TYPES: [&str; 3] = ["ping", "pong", "heartbeat"];

/// Result of decoding one text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A `ping`/`pong`/`heartbeat` control message.
    Control,
    /// Zero or more valid records. Invalid records were already dropped.
    Updates {
        /// Records that passed validation, in frame order.
        updates: Vec<PositionUpdate>,
        /// Records that were present but discarded.
        dropped: usize,
    },
    /// Not JSON, or JSON that is neither an object nor an array.
    Malformed,
}

/// Decode one text frame.
pub fn decode_frame(text: &str) -> Inbound {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Inbound::Malformed;
    };
    match &value {
        Value::Object(_) if is_control(&value) => Inbound::Control,
        Value::Object(_) => collect(std::slice::from_ref(&value)),
        Value::Array(items) => collect(items),
        _ => Inbound::Malformed,
    }
}

fn is_control(value: &Value) -> bool {
    value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| CONTROL_TYPES.contains(&kind))
}

fn collect(items: &[Value]) -> Inbound {
    let updates: Vec<PositionUpdate> = items.iter().filter_map(decode_record).collect();
    let dropped = items.len().saturating_sub(updates.len());
    Inbound::Updates { updates, dropped }
}

/// Decode one record, or `None` if mandatory fields are missing or invalid.
///
/// - id: `train_id`, falling back to `id`; strings or numbers, non-empty
/// - latitude: numeric `lat`
/// - longitude: numeric `lon`, falling back to numeric `lng`
/// - speed: numeric, finite, non-negative `speed`; otherwise absent
/// - timestamp: integer milliseconds or an RFC 3339 string
/// - label: string `popup`
pub fn decode_record(value: &Value) -> Option<PositionUpdate> {
    let object = value.as_object()?;
    if is_control(value) {
        return None;
    }

    let id = object
        .get("train_id")
        .and_then(id_from)
        .or_else(|| object.get("id").and_then(id_from))?;
    let lat = object.get("lat").and_then(Value::as_f64)?;
    let lng = object
        .get("lon")
        .and_then(Value::as_f64)
        .or_else(|| object.get("lng").and_then(Value::as_f64))?;

    let mut update = PositionUpdate::new(id, lat, lng);
    if !update.position().is_valid() {
        return None;
    }

    update.speed_kmh = object
        .get("speed")
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite() && *s >= 0.0);
    update.timestamp_ms = object.get("timestamp").and_then(timestamp_from);
    update.label = object
        .get("popup")
        .and_then(Value::as_str)
        .map(str::to_owned);
    Some(update)
}

fn id_from(value: &Value) -> Option<EntityId> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(EntityId::new(s.trim())),
        Value::Number(n) => Some(EntityId::new(n.to_string())),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn timestamp_from(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}
