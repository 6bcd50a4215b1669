//! Stop detection over a historical track.
//!
//! A single left-to-right pass keeps a window start index. Any pair of
//! consecutive points that looks like motion (reported speed or covered
//! distance above threshold) restarts the window at the current point.
//! Once the window has lasted long enough a stop is emitted at the
//! window's midpoint and the window jumps past the current point, so a
//! long dwell is never reported twice from overlapping windows.

use serde::{Deserialize, Serialize};
use trainwatch_types::{HistoryPoint, StopInterval};

use crate::distance::distance_m;

/// Default distance (m) between consecutive points still considered stationary.
const DEFAULT_MAX_MOVED_M: f64 = 20.0;
/// Default reported speed (km/h) still considered stationary.
const DEFAULT_MAX_SPEED_KMH: f64 = 0.5;
/// Default minimum dwell (seconds) for a stop.
const DEFAULT_MIN_DWELL_SECS: u64 = 300;

/// Thresholds that decide when a stretch of track counts as a stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopThresholds {
    /// Maximum distance in meters between consecutive points for the pair
    /// to count as stationary.
    #[serde(default = "default_max_moved_m")]
    pub max_moved_m: f64,
    /// Maximum reported speed in km/h for a point to count as stationary.
    #[serde(default = "default_max_speed_kmh")]
    pub max_speed_kmh: f64,
    /// Minimum dwell duration in seconds before a stop is registered.
    #[serde(default = "default_min_dwell_secs")]
    pub min_dwell_secs: u64,
}

const fn default_max_moved_m() -> f64 {
    DEFAULT_MAX_MOVED_M
}

const fn default_max_speed_kmh() -> f64 {
    DEFAULT_MAX_SPEED_KMH
}

const fn default_min_dwell_secs() -> u64 {
    DEFAULT_MIN_DWELL_SECS
}

impl Default for StopThresholds {
    fn default() -> Self {
        Self {
            max_moved_m: DEFAULT_MAX_MOVED_M,
            max_speed_kmh: DEFAULT_MAX_SPEED_KMH,
            min_dwell_secs: DEFAULT_MIN_DWELL_SECS,
        }
    }
}

impl StopThresholds {
    /// Minimum dwell expressed in milliseconds.
    pub fn min_dwell_ms(&self) -> i64 {
        i64::try_from(self.min_dwell_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    /// Whether moving from `prev` to `cur` counts as motion.
    fn is_moving(&self, prev: &HistoryPoint, cur: &HistoryPoint) -> bool {
        let reported_fast = cur.speed.is_some_and(|s| s > self.max_speed_kmh);
        reported_fast || distance_m(prev.position(), cur.position()) > self.max_moved_m
    }
}

/// Detect stop intervals in a track ordered by ascending timestamp.
///
/// Out-of-order input is not supported; it will not panic but the result
/// is meaningless.
pub fn detect_stops(points: &[HistoryPoint], thresholds: &StopThresholds) -> Vec<StopInterval> {
    let min_dwell_ms = thresholds.min_dwell_ms();
    let mut stops = Vec::new();
    let mut window_start = 0_usize;

    for (offset, pair) in points.windows(2).enumerate() {
        let [prev, cur] = pair else { continue };
        let i = offset.saturating_add(1);

        if thresholds.is_moving(prev, cur) {
            window_start = i;
            continue;
        }

        let Some(start) = points.get(window_start) else {
            continue;
        };
        let dwell_ms = cur.timestamp.saturating_sub(start.timestamp);
        if dwell_ms < min_dwell_ms {
            continue;
        }

        let mid = window_start.saturating_add(i) / 2;
        if let Some(anchor) = points.get(mid) {
            stops.push(StopInterval {
                lat: anchor.lat,
                lng: anchor.lng,
                from_timestamp_ms: start.timestamp,
                to_timestamp_ms: cur.timestamp,
            });
        }
        window_start = i.saturating_add(1);
    }

    stops
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;
    const MINUTE: i64 = 60_000;

    fn point(lat: f64, lng: f64, timestamp: i64) -> HistoryPoint {
        HistoryPoint {
            lat,
            lng,
            timestamp,
            speed: None,
        }
    }

    /// Five minutes of motion heading north into (10.0, 77.0), a dwell of
    /// `dwell_minutes` sampled every minute, then five minutes moving away.
    fn track_with_dwell(dwell_minutes: i64) -> Vec<HistoryPoint> {
        let mut points = Vec::new();
        let mut t = T0;
        for step in (1..=5).rev() {
            points.push(point(10.0 - 0.01 * f64::from(step), 77.0, t));
            t += MINUTE;
        }
        for _ in 0..=dwell_minutes {
            points.push(point(10.0, 77.0, t));
            t += MINUTE;
        }
        for step in 1..=5 {
            points.push(point(10.0 + 0.01 * f64::from(step), 77.0, t));
            t += MINUTE;
        }
        points
    }

    #[test]
    fn six_minute_dwell_yields_one_stop() {
        let points = track_with_dwell(6);
        let stops = detect_stops(&points, &StopThresholds::default());
        assert_eq!(stops.len(), 1, "stops: {stops:?}");

        let stop = stops.first().unwrap();
        assert!((stop.lat - 10.0).abs() < 1e-9);
        assert!((stop.lng - 77.0).abs() < 1e-9);
        // The dwell starts at the first stationary sample.
        assert_eq!(stop.from_timestamp_ms, T0 + 5 * MINUTE);
        assert!(stop.duration_ms() >= 300_000);
        assert!(stop.to_timestamp_ms <= T0 + 11 * MINUTE);
    }

    #[test]
    fn four_minute_dwell_yields_nothing() {
        let points = track_with_dwell(4);
        assert!(detect_stops(&points, &StopThresholds::default()).is_empty());
    }

    #[test]
    fn long_dwell_is_reported_once_per_full_window() {
        // 12 minutes stationary: the window fires at 5 minutes, jumps past,
        // restarts at minute 6 and fires again at minute 11.
        let points: Vec<_> = (0..=12).map(|m| point(10.0, 77.0, T0 + m * MINUTE)).collect();
        let stops = detect_stops(&points, &StopThresholds::default());
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].from_timestamp_ms, T0);
        assert_eq!(stops[0].to_timestamp_ms, T0 + 5 * MINUTE);
        assert_eq!(stops[1].from_timestamp_ms, T0 + 6 * MINUTE);
        assert_eq!(stops[1].to_timestamp_ms, T0 + 11 * MINUTE);
    }

    #[test]
    fn stop_is_located_at_window_midpoint() {
        // Slow creep below 20 m per step; the midpoint sample carries the
        // marker, not the centroid.
        let points: Vec<_> = (0..=5_i32)
            .map(|m| point(10.0 + 0.0001 * f64::from(m), 77.0, T0 + i64::from(m) * MINUTE))
            .collect();
        let stops = detect_stops(&points, &StopThresholds::default());
        assert_eq!(stops.len(), 1);
        // window 0..=5, midpoint index 2
        assert!((stops[0].lat - 10.0002).abs() < 1e-9);
    }

    #[test]
    fn reported_speed_breaks_the_window() {
        let mut points: Vec<_> = (0..=6).map(|m| point(10.0, 77.0, T0 + m * MINUTE)).collect();
        points[3].speed = Some(12.0);
        // Window restarts at index 3 and only spans 3 minutes afterwards.
        assert!(detect_stops(&points, &StopThresholds::default()).is_empty());

        points[3].speed = Some(0.4);
        assert_eq!(detect_stops(&points, &StopThresholds::default()).len(), 1);
    }

    #[test]
    fn thresholds_are_configurable() {
        let points: Vec<_> = (0..=3).map(|m| point(10.0, 77.0, T0 + m * MINUTE)).collect();
        let short = StopThresholds {
            min_dwell_secs: 120,
            ..StopThresholds::default()
        };
        assert_eq!(detect_stops(&points, &short).len(), 1);
        assert!(detect_stops(&points, &StopThresholds::default()).is_empty());
    }

    #[test]
    fn degenerate_inputs() {
        let thresholds = StopThresholds::default();
        assert!(detect_stops(&[], &thresholds).is_empty());
        assert!(detect_stops(&[point(10.0, 77.0, T0)], &thresholds).is_empty());
    }

    #[test]
    fn thresholds_default_from_empty_yaml_object() {
        let t: StopThresholds = serde_json::from_str("{}").unwrap();
        assert_eq!(t, StopThresholds::default());
        assert_eq!(t.min_dwell_ms(), 300_000);
    }
}
