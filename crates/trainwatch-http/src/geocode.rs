//! Reverse geocoding: coordinates to a human-readable place name.
//!
//! Lookups are a best-effort enrichment. [`CachedGeocoder`] sits in front
//! of any [`Geocoder`] and flattens every failure to `None`, so callers
//! only ever see "a place name" or "unknown place".

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};
use trainwatch_core::config::GeocodingConfig;
use trainwatch_types::Coordinate;

use crate::error::HttpError;

/// Address fields consulted for a place name, most specific first.
const ADDRESS_PRIORITY: [&str; 7] = [
    "city",
    "town",
    "municipality",
    "village",
    "county",
    "state_district",
    "state",
];

/// How many leading `display_name` components the fallback inspects.
const DISPLAY_NAME_SCAN: usize = 3;

/// A reverse geocoding backend.
///
/// Used through generics; async trait methods are not dyn-compatible.
pub trait Geocoder: Send + Sync {
    /// Resolve `at` to a place name. `Ok(None)` means the service had no
    /// usable name for the location.
    fn reverse(&self, at: Coordinate) -> impl Future<Output = Result<Option<String>, HttpError>> + Send;
}

/// Client for a Nominatim-compatible `/reverse` endpoint.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    zoom: u8,
}

impl NominatimGeocoder {
    /// Build a client. Nominatim's usage policy requires the configured
    /// `User-Agent` on every request.
    pub fn new(config: &GeocodingConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|source| HttpError::Client { source })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            zoom: config.zoom,
        })
    }
}

impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, at: Coordinate) -> Result<Option<String>, HttpError> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", String::from("json")),
                ("lat", at.lat.to_string()),
                ("lon", at.lng.to_string()),
                ("zoom", self.zoom.to_string()),
                ("addressdetails", String::from("1")),
            ])
            .send()
            .await
            .map_err(|source| HttpError::Request { source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(HttpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|source| HttpError::Decode { source })?;
        Ok(extract_place_name(&json))
    }
}

/// Pick a place name out of a Nominatim `/reverse` response.
///
/// The first non-blank address field in [`ADDRESS_PRIORITY`] order wins.
/// Otherwise the first of the leading `display_name` components that is
/// longer than two characters and not purely numeric (postcodes, house
/// numbers) is used.
pub fn extract_place_name(response: &Value) -> Option<String> {
    let from_address = response.get("address").and_then(|address| {
        ADDRESS_PRIORITY.iter().find_map(|field| {
            address
                .get(field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
        })
    });
    if let Some(name) = from_address {
        return Some(name.to_owned());
    }

    response
        .get("display_name")
        .and_then(Value::as_str)?
        .split(',')
        .map(str::trim)
        .take(DISPLAY_NAME_SCAN)
        .find(|part| part.chars().count() > 2 && !part.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_owned)
}

/// Bounded, insertion-ordered cache plus the request pacing clock.
#[derive(Debug, Default)]
struct CacheState {
    names: HashMap<String, String>,
    order: VecDeque<String>,
    last_request: Option<Instant>,
}

impl CacheState {
    fn insert(&mut self, key: String, name: String, capacity: usize) {
        if self.names.insert(key.clone(), name).is_none() {
            self.order.push_back(key);
        }
        while self.names.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.names.remove(&oldest);
        }
    }
}

/// A caching, rate-limited front for a [`Geocoder`].
///
/// - Keys are the coordinates rounded to `precision_decimals` places
///   (4 decimals is roughly 11 m).
/// - Only resolved names are cached. Past `cache_capacity` the oldest
///   entry is dropped.
/// - Upstream requests are spaced at least `min_interval_ms` apart. A
///   cache miss inside the interval is answered with `None` immediately.
#[derive(Debug)]
pub struct CachedGeocoder<G> {
    inner: G,
    state: Mutex<CacheState>,
    precision: usize,
    capacity: usize,
    min_interval: Duration,
}

impl<G: Geocoder> CachedGeocoder<G> {
    /// Wrap `inner` with the cache and pacing settings from `config`.
    pub fn new(inner: G, config: &GeocodingConfig) -> Self {
        Self {
            inner,
            state: Mutex::new(CacheState::default()),
            precision: usize::try_from(config.precision_decimals).unwrap_or(usize::MAX),
            capacity: config.cache_capacity,
            min_interval: Duration::from_millis(config.min_interval_ms),
        }
    }

    /// Cache key for `at`.
    pub fn cache_key(&self, at: Coordinate) -> String {
        format!("{:.prec$},{:.prec$}", at.lat, at.lng, prec = self.precision)
    }

    /// Number of cached names.
    pub async fn cached(&self) -> usize {
        self.state.lock().await.names.len()
    }

    /// Best-effort place name for `at`. Never fails: errors, pacing and
    /// invalid coordinates all yield `None`.
    pub async fn place_name(&self, at: Coordinate) -> Option<String> {
        if !at.is_valid() {
            return None;
        }
        let key = self.cache_key(at);

        {
            let mut state = self.state.lock().await;
            if let Some(name) = state.names.get(&key) {
                trace!(%key, "Geocode cache hit");
                return Some(name.clone());
            }
            let now = Instant::now();
            if state
                .last_request
                .is_some_and(|last| now.saturating_duration_since(last) < self.min_interval)
            {
                debug!(%key, "Geocode request suppressed by rate limit");
                return None;
            }
            state.last_request = Some(now);
        }

        match self.inner.reverse(at).await {
            Ok(Some(name)) => {
                self.state
                    .lock()
                    .await
                    .insert(key, name.clone(), self.capacity);
                Some(name)
            }
            Ok(None) => None,
            Err(e) => {
                debug!(%key, error = %e, "Reverse geocoding failed");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    /// Answers with a fixed name (or an error) and counts calls.
    struct Scripted {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Scripted {
        const fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    impl Geocoder for Scripted {
        async fn reverse(&self, at: Coordinate) -> Result<Option<String>, HttpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(HttpError::Status {
                    status: 503,
                    body: String::new(),
                });
            }
            Ok(Some(format!("place {:.1}", at.lat)))
        }
    }

    fn config(min_interval_ms: u64, capacity: usize) -> GeocodingConfig {
        GeocodingConfig {
            min_interval_ms,
            cache_capacity: capacity,
            ..GeocodingConfig::default()
        }
    }

    #[test]
    fn address_priority_order() {
        let response = json!({
            "address": {"state": "Maharashtra", "county": "Mumbai Suburban", "town": "Andheri"},
            "display_name": "ignored"
        });
        assert_eq!(extract_place_name(&response).as_deref(), Some("Andheri"));

        let response = json!({"address": {"city": "  ", "village": "Lonavala"}});
        assert_eq!(extract_place_name(&response).as_deref(), Some("Lonavala"));
    }

    #[test]
    fn display_name_fallback_skips_numbers_and_short_parts() {
        let response = json!({"address": {}, "display_name": "42, NH, Kalyan Junction, Thane, India"});
        assert_eq!(extract_place_name(&response).as_deref(), Some("Kalyan Junction"));

        // Only the first three components are considered.
        let response = json!({"display_name": "1, 2, 3, Pune"});
        assert_eq!(extract_place_name(&response), None);

        assert_eq!(extract_place_name(&json!({"error": "Unable to geocode"})), None);
    }

    #[test]
    fn cache_key_rounds_to_precision() {
        let geocoder = CachedGeocoder::new(Scripted::new(false), &config(0, 10));
        assert_eq!(geocoder.cache_key(Coordinate::new(19.076_04, 72.877_66)), "19.0760,72.8777");
    }

    #[tokio::test(start_paused = true)]
    async fn hits_are_served_from_cache() {
        let geocoder = CachedGeocoder::new(Scripted::new(false), &config(1_000, 10));
        let at = Coordinate::new(19.076, 72.877);

        assert_eq!(geocoder.place_name(at).await.as_deref(), Some("place 19.1"));
        // Within the pacing interval, but a cache hit needs no request.
        let nearby = Coordinate::new(19.076_01, 72.877_01);
        assert_eq!(geocoder.place_name(nearby).await.as_deref(), Some("place 19.1"));
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn misses_inside_the_interval_are_unknown() {
        let geocoder = CachedGeocoder::new(Scripted::new(false), &config(1_000, 10));
        assert!(geocoder.place_name(Coordinate::new(10.0, 70.0)).await.is_some());
        assert!(geocoder.place_name(Coordinate::new(11.0, 70.0)).await.is_none());

        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert!(geocoder.place_name(Coordinate::new(11.0, 70.0)).await.is_some());
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn capacity_drops_the_oldest_entry() {
        let geocoder = CachedGeocoder::new(Scripted::new(false), &config(0, 2));
        for lat in [1.0, 2.0, 3.0] {
            let _ = geocoder.place_name(Coordinate::new(lat, 0.0)).await;
        }
        assert_eq!(geocoder.cached().await, 2);

        // The first coordinate was evicted, so it is requested again.
        let _ = geocoder.place_name(Coordinate::new(1.0, 0.0)).await;
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 4);
        let _ = geocoder.place_name(Coordinate::new(3.0, 0.0)).await;
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failures_are_unknown_and_not_cached() {
        let geocoder = CachedGeocoder::new(Scripted::new(true), &config(0, 10));
        let at = Coordinate::new(10.0, 70.0);
        assert!(geocoder.place_name(at).await.is_none());
        assert!(geocoder.place_name(at).await.is_none());
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(geocoder.cached().await, 0);
    }

    #[tokio::test]
    async fn invalid_coordinates_skip_the_backend() {
        let geocoder = CachedGeocoder::new(Scripted::new(false), &config(0, 10));
        assert!(geocoder.place_name(Coordinate::new(f64::NAN, 0.0)).await.is_none());
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 0);
    }
}
