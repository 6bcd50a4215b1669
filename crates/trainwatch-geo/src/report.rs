//! Turn a fetched history track into something the map can draw.

use std::fmt::Display;

use chrono::TimeZone;
use trainwatch_types::{Coordinate, EntityId, HistoryPoint, HistoryReport, StopInterval, StopMarker};

use crate::stops::{StopThresholds, detect_stops};

/// Timestamp layout used in stop popups.
const POPUP_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Popup on the marker for the final stop of a track.
pub const LAST_HALT_POPUP: &str = "Last significant halt";

/// Info line shown when the history endpoint returned no points.
pub const EMPTY_HISTORY_INFO: &str = "No history points found for this query.";

/// Render a millisecond timestamp in `tz` for display.
///
/// Timestamps chrono cannot represent fall back to the raw number.
pub fn format_timestamp<Tz>(timestamp_ms: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    tz.timestamp_millis_opt(timestamp_ms).single().map_or_else(
        || timestamp_ms.to_string(),
        |dt| dt.format(POPUP_TIME_FORMAT).to_string(),
    )
}

/// Popup text for a stop: `Stop: <from> ↔ <to>`.
pub fn stop_popup<Tz>(stop: &StopInterval, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "Stop: {} ↔ {}",
        format_timestamp(stop.from_timestamp_ms, tz),
        format_timestamp(stop.to_timestamp_ms, tz)
    )
}

/// Build the complete [`HistoryReport`] for `points`.
///
/// Stop detection is only run when there is something to analyze; an
/// empty track produces an empty report with the "no points" info line.
pub fn build_report<Tz>(
    train_id: EntityId,
    points: &[HistoryPoint],
    thresholds: &StopThresholds,
    tz: &Tz,
) -> HistoryReport
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if points.is_empty() {
        return HistoryReport {
            train_id,
            points: Vec::new(),
            stops: Vec::new(),
            last_halt: None,
            info: EMPTY_HISTORY_INFO.to_owned(),
        };
    }

    let stops: Vec<StopMarker> = detect_stops(points, thresholds)
        .iter()
        .map(|stop| StopMarker {
            lat: stop.lat,
            lng: stop.lng,
            from_ms: stop.from_timestamp_ms,
            to_ms: stop.to_timestamp_ms,
            popup: stop_popup(stop, tz),
        })
        .collect();

    HistoryReport {
        train_id,
        points: points.iter().map(HistoryPoint::position).collect::<Vec<Coordinate>>(),
        last_halt: stops.last().map(|stop| StopMarker {
            popup: LAST_HALT_POPUP.to_owned(),
            ..stop.clone()
        }),
        stops,
        info: format!("Loaded {} points", points.len()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn popup_uses_readable_timestamps() {
        let stop = StopInterval {
            lat: 10.0,
            lng: 77.0,
            // 2024-01-01T10:00:00Z .. 10:06:00Z
            from_timestamp_ms: 1_704_103_200_000,
            to_timestamp_ms: 1_704_103_560_000,
        };
        assert_eq!(
            stop_popup(&stop, &Utc),
            "Stop: 2024-01-01 10:00:00 ↔ 2024-01-01 10:06:00"
        );
    }

    #[test]
    fn unrepresentable_timestamp_falls_back_to_raw() {
        assert_eq!(format_timestamp(i64::MAX, &Utc), i64::MAX.to_string());
    }

    #[test]
    fn empty_history_reports_no_points() {
        let report = build_report(EntityId::from("12951"), &[], &StopThresholds::default(), &Utc);
        assert!(report.points.is_empty());
        assert!(report.stops.is_empty());
        assert!(report.last_halt.is_none());
        assert_eq!(report.info, EMPTY_HISTORY_INFO);
    }

    #[test]
    fn report_marks_last_halt() {
        let t0 = 1_704_103_200_000_i64;
        // Two separate 5-minute dwells split by a 1 km hop.
        let mut points: Vec<HistoryPoint> = (0..=5)
            .map(|m| HistoryPoint {
                lat: 10.0,
                lng: 77.0,
                timestamp: t0 + m * 60_000,
                speed: Some(0.0),
            })
            .collect();
        points.extend((6..=11).map(|m| HistoryPoint {
            lat: 10.01,
            lng: 77.0,
            timestamp: t0 + m * 60_000,
            speed: Some(0.0),
        }));

        let report = build_report(EntityId::from("12951"), &points, &StopThresholds::default(), &Utc);
        assert_eq!(report.info, "Loaded 12 points");
        assert_eq!(report.points.len(), 12);
        assert_eq!(report.stops.len(), 2);

        let last = report.last_halt.unwrap();
        let final_stop = report.stops.last().unwrap();
        assert_eq!(last.popup, LAST_HALT_POPUP);
        assert_eq!((last.from_ms, last.to_ms), (final_stop.from_ms, final_stop.to_ms));
        assert!((last.lat - 10.01).abs() < 1e-9);
        assert!(final_stop.popup.starts_with("Stop: 2024-01-01 10:06:00"));
    }
}
