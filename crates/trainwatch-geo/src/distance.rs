//! Great-circle distance and the quantities derived from it.
//!
//! [`distance_m`] is the only distance primitive in the workspace. Speed
//! derivation, trail downsampling, and stop detection all call it so that
//! every threshold is measured the same way.

use trainwatch_types::Coordinate;

/// Mean Earth radius in meters used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Smallest elapsed time (ms) used when deriving a speed.
///
/// Two samples with identical (or reversed) timestamps would otherwise
/// divide by zero or produce a negative speed.
pub const MIN_ELAPSED_MS: i64 = 1;

/// Meters-per-second to kilometers-per-hour factor.
const MPS_TO_KMH: f64 = 3.6;

/// Great-circle distance between two coordinates in meters (haversine).
///
/// ```
/// use trainwatch_geo::distance::distance_m;
/// use trainwatch_types::Coordinate;
///
/// let d = distance_m(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0));
/// assert!((d - 111_195.0).abs() < 50.0);
/// ```
pub fn distance_m(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Planar distance in degrees, `sqrt(dlat^2 + dlng^2)`.
///
/// Only used to size interpolation durations, where a cheap monotone
/// measure of "how far the marker jumps on screen" is all that matters.
pub fn degree_distance(from: Coordinate, to: Coordinate) -> f64 {
    let d_lat = to.lat - from.lat;
    let d_lng = to.lng - from.lng;
    d_lat.hypot(d_lng)
}

/// Convert a distance covered in `elapsed_ms` into km/h.
///
/// The elapsed time is clamped to at least [`MIN_ELAPSED_MS`].
pub fn speed_kmh(distance_m: f64, elapsed_ms: i64) -> f64 {
    let elapsed_ms = elapsed_ms.max(MIN_ELAPSED_MS);
    #[allow(clippy::cast_precision_loss)]
    let elapsed_secs = elapsed_ms as f64 / 1000.0;
    distance_m * MPS_TO_KMH / elapsed_secs
}

/// Speed in km/h implied by moving from `from` to `to` in `elapsed_ms`.
pub fn speed_between_kmh(from: Coordinate, to: Coordinate, elapsed_ms: i64) -> f64 {
    speed_kmh(distance_m(from, to), elapsed_ms)
}
