//! Geodesy and historical track analysis for Trainwatch.
//!
//! Everything in this crate is a pure function over coordinates and point
//! sequences. There is no I/O and no clock; callers supply timestamps and
//! the time zone used for display.
//!
//! # Modules
//!
//! - [`distance`] -- Haversine distance and speed derivation
//! - [`stops`] -- Sliding-window stop detection
//! - [`report`] -- History report assembly and popup text

pub mod distance;
pub mod report;
pub mod stops;

pub use distance::{EARTH_RADIUS_M, degree_distance, distance_m, speed_between_kmh, speed_kmh};
pub use report::{build_report, format_timestamp, stop_popup};
pub use stops::{StopThresholds, detect_stops};
