//! HTTP collaborators of the Trainwatch tracker.
//!
//! The tracker consumes two external HTTP services and owns neither:
//!
//! - [`history`] -- the historical track endpoint (`GET /api/history`),
//!   plus query parameter parsing and the stop-annotated report
//! - [`geocode`] -- best-effort reverse geocoding against a
//!   Nominatim-compatible service, cached and rate-limited
//!
//! Both talk over `reqwest`. Failures are typed [`HttpError`]s; the
//! geocoder flattens them to "unknown place" at its cached surface.

pub mod error;
pub mod geocode;
pub mod history;

pub use error::HttpError;
pub use geocode::{CachedGeocoder, Geocoder, NominatimGeocoder, extract_place_name};
pub use history::{HistoryClient, HistoryQuery, parse_time_param};
