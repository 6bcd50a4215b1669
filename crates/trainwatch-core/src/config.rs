//! Configuration loading and typed config structures for the tracker.
//!
//! The canonical configuration lives in `trainwatch-config.yaml` at the
//! project root (the path can be overridden with `TRAINWATCH_CONFIG`). This
//! module defines strongly-typed structs that mirror the YAML structure and
//! a loader that reads, overrides, and validates the file.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;
use trainwatch_geo::StopThresholds;

/// Env var naming the configuration file path.
pub const CONFIG_PATH_ENV: &str = "TRAINWATCH_CONFIG";

/// Configuration file used when [`CONFIG_PATH_ENV`] is not set.
pub const DEFAULT_CONFIG_PATH: &str = "trainwatch-config.yaml";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is outside its allowed range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level tracker configuration.
///
/// Mirrors the structure of `trainwatch-config.yaml`. Every field has a
/// default so an empty file (or no file at all) is a working setup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TrackerConfig {
    /// Streaming feed connection.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Reconciliation loop timing and staleness.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    /// Marker motion interpolation.
    #[serde(default)]
    pub motion: MotionConfig,

    /// Trail downsampling and bounds.
    #[serde(default)]
    pub trail: TrailConfig,

    /// Stop detection thresholds for history analysis.
    #[serde(default)]
    pub stops: StopThresholds,

    /// Historical query endpoint.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Reverse geocoding.
    #[serde(default)]
    pub geocoding: GeocodingConfig,

    /// Rendering surface server.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TrackerConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for deployment URLs:
    /// - `FEED_URL` overrides `feed.url`
    /// - `HISTORY_URL` overrides `history.base_url`
    /// - `GEOCODER_URL` overrides `geocoding.base_url`
    /// - `OBSERVER_PORT` overrides `observer.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from `TRAINWATCH_CONFIG` or [`DEFAULT_CONFIG_PATH`].
    ///
    /// A missing file is not an error: defaults (plus env overrides) are
    /// used instead.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
        let path = Path::new(&path);
        if path.exists() {
            return Self::from_file(path);
        }
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// No environment overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml maps an empty document to unit, not to an empty mapping.
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Override deployment URLs with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FEED_URL") {
            self.feed.url = val;
        }
        if let Ok(val) = std::env::var("HISTORY_URL") {
            self.history.base_url = val;
        }
        if let Ok(val) = std::env::var("GEOCODER_URL") {
            self.geocoding.base_url = val;
        }
        if let Ok(val) = std::env::var("OBSERVER_PORT") {
            match val.parse::<u16>() {
                Ok(port) => self.observer.port = port,
                Err(_) => warn!(value = %val, "Ignoring unparseable OBSERVER_PORT"),
            }
        }
    }

    /// Check cross-field and range constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("feed.heartbeat_interval_ms", self.feed.heartbeat_interval_ms)?;
        non_zero(
            "feed.liveness_multiplier",
            u64::from(self.feed.liveness_multiplier),
        )?;
        non_zero("feed.connect_timeout_ms", self.feed.connect_timeout_ms)?;
        non_zero("feed.backoff.base_ms", self.feed.backoff.base_ms)?;
        if !self.feed.backoff.factor.is_finite() || self.feed.backoff.factor < 1.0 {
            return Err(ConfigError::Invalid {
                field: "feed.backoff.factor",
                reason: format!("must be a finite number >= 1.0, got {}", self.feed.backoff.factor),
            });
        }
        if self.feed.backoff.max_ms < self.feed.backoff.base_ms {
            return Err(ConfigError::Invalid {
                field: "feed.backoff.max_ms",
                reason: String::from("must be >= feed.backoff.base_ms"),
            });
        }

        non_zero("reconciliation.tick_interval_ms", self.reconciliation.tick_interval_ms)?;
        non_zero("reconciliation.frame_interval_ms", self.reconciliation.frame_interval_ms)?;
        non_zero("reconciliation.stale_after_ms", self.reconciliation.stale_after_ms)?;
        if !self.reconciliation.snap_epsilon_deg.is_finite() || self.reconciliation.snap_epsilon_deg < 0.0 {
            return Err(ConfigError::Invalid {
                field: "reconciliation.snap_epsilon_deg",
                reason: String::from("must be a finite, non-negative number of degrees"),
            });
        }

        if self.motion.min_duration_ms > self.motion.max_duration_ms {
            return Err(ConfigError::Invalid {
                field: "motion.min_duration_ms",
                reason: format!(
                    "{} exceeds motion.max_duration_ms ({})",
                    self.motion.min_duration_ms, self.motion.max_duration_ms
                ),
            });
        }

        if self.trail.max_points == 0 {
            return Err(ConfigError::Invalid {
                field: "trail.max_points",
                reason: String::from("must be at least 1"),
            });
        }
        if !self.trail.min_segment_m.is_finite() || self.trail.min_segment_m < 0.0 {
            return Err(ConfigError::Invalid {
                field: "trail.min_segment_m",
                reason: String::from("must be a finite, non-negative distance"),
            });
        }

        if self.geocoding.cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "geocoding.cache_capacity",
                reason: String::from("must be at least 1"),
            });
        }
        Ok(())
    }
}

/// The subset of [`TrackerConfig`] the reconciliation engine needs.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Entities silent for longer than this are evicted.
    pub stale_after_ms: u64,
    /// Per-axis delta (degrees) below which an update snaps.
    pub snap_epsilon_deg: f64,
    /// Interpolation timing.
    pub motion: MotionConfig,
    /// Trail bounds.
    pub trail: TrailConfig,
}

impl EngineSettings {
    /// Extract engine settings from the full configuration.
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            stale_after_ms: config.reconciliation.stale_after_ms,
            snap_epsilon_deg: config.reconciliation.snap_epsilon_deg,
            motion: config.motion.clone(),
            trail: config.trail.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}

fn non_zero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: String::from("must be greater than zero"),
        });
    }
    Ok(())
}

/// Streaming feed configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedConfig {
    /// WebSocket URL of the live position feed.
    #[serde(default = "default_feed_url")]
    pub url: String,

    /// Interval between outbound pings while connected.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Silence longer than this many heartbeat intervals forces a reconnect.
    #[serde(default = "default_liveness_multiplier")]
    pub liveness_multiplier: u32,

    /// Upper bound on a single connect attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Reconnect backoff curve.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl FeedConfig {
    /// Ping period in milliseconds. Zero is raised to 1 ms.
    pub fn heartbeat_period_ms(&self) -> u64 {
        self.heartbeat_interval_ms.max(1)
    }

    /// Silence window after which the connection is considered dead.
    pub fn liveness_timeout_ms(&self) -> u64 {
        self.heartbeat_period_ms()
            .saturating_mul(u64::from(self.liveness_multiplier.max(1)))
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            liveness_multiplier: default_liveness_multiplier(),
            connect_timeout_ms: default_connect_timeout_ms(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential reconnect backoff: `min(max, base * factor^attempt) + jitter`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackoffConfig {
    /// Delay for attempt zero, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,

    /// Growth factor per attempt.
    #[serde(default = "default_backoff_factor")]
    pub factor: f64,

    /// Cap on the exponential part, in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,

    /// Upper bound of the uniform random jitter added on top, in milliseconds.
    #[serde(default = "default_backoff_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: default_backoff_base_ms(),
            factor: default_backoff_factor(),
            max_ms: default_backoff_max_ms(),
            jitter_ms: default_backoff_jitter_ms(),
        }
    }
}

/// Reconciliation loop configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReconciliationConfig {
    /// Period of the reconciliation tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Period of the interpolation frame stepper.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Entities silent for longer than this are evicted.
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,

    /// Per-axis delta (degrees) below which an update snaps instead of animating.
    #[serde(default = "default_snap_epsilon_deg")]
    pub snap_epsilon_deg: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            stale_after_ms: default_stale_after_ms(),
            snap_epsilon_deg: default_snap_epsilon_deg(),
        }
    }
}

/// Marker interpolation timing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MotionConfig {
    /// Shortest animation, in milliseconds.
    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: u64,

    /// Longest animation, in milliseconds.
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,

    /// Animation time per degree of planar distance before clamping.
    #[serde(default = "default_ms_per_degree")]
    pub ms_per_degree: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: default_min_duration_ms(),
            max_duration_ms: default_max_duration_ms(),
            ms_per_degree: default_ms_per_degree(),
        }
    }
}

/// Trail downsampling and bounds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrailConfig {
    /// Points closer than this (meters) to the last stored point are dropped.
    #[serde(default = "default_min_segment_m")]
    pub min_segment_m: f64,

    /// Maximum number of points kept; the oldest are dropped first.
    #[serde(default = "default_max_points")]
    pub max_points: usize,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            min_segment_m: default_min_segment_m(),
            max_points: default_max_points(),
        }
    }
}

/// Historical query endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryConfig {
    /// Base URL; `/api/history` is appended.
    #[serde(default = "default_history_url")]
    pub base_url: String,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_history_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Reverse geocoding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeocodingConfig {
    /// Whether place names are looked up at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Nominatim-compatible base URL.
    #[serde(default = "default_geocoder_url")]
    pub base_url: String,

    /// `User-Agent` sent with every lookup.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum cached place names.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Decimal places used to build the cache key.
    #[serde(default = "default_precision_decimals")]
    pub precision_decimals: u32,

    /// Minimum spacing between upstream requests.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Nominatim zoom level (10 = city).
    #[serde(default = "default_zoom")]
    pub zoom: u8,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            base_url: default_geocoder_url(),
            user_agent: default_user_agent(),
            cache_capacity: default_cache_capacity(),
            precision_decimals: default_precision_decimals(),
            min_interval_ms: default_min_interval_ms(),
            zoom: default_zoom(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Rendering surface server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Bind address.
    #[serde(default = "default_observer_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_observer_port")]
    pub port: u16,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            host: default_observer_host(),
            port: default_observer_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_feed_url() -> String {
    String::from("ws://localhost:8080")
}

const fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

const fn default_liveness_multiplier() -> u32 {
    3
}

const fn default_connect_timeout_ms() -> u64 {
    10_000
}

const fn default_backoff_base_ms() -> u64 {
    1_000
}

const fn default_backoff_factor() -> f64 {
    1.6
}

const fn default_backoff_max_ms() -> u64 {
    30_000
}

const fn default_backoff_jitter_ms() -> u64 {
    300
}

const fn default_tick_interval_ms() -> u64 {
    100
}

const fn default_frame_interval_ms() -> u64 {
    16
}

const fn default_stale_after_ms() -> u64 {
    600_000
}

const fn default_snap_epsilon_deg() -> f64 {
    0.000_04
}

const fn default_min_duration_ms() -> u64 {
    100
}

const fn default_max_duration_ms() -> u64 {
    1_000
}

const fn default_ms_per_degree() -> f64 {
    4_000.0
}

const fn default_min_segment_m() -> f64 {
    5.0
}

const fn default_max_points() -> usize {
    500
}

fn default_history_url() -> String {
    String::from("http://localhost:8000")
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_geocoder_url() -> String {
    String::from("https://nominatim.openstreetmap.org")
}

fn default_user_agent() -> String {
    String::from("TrainTracker/1.0")
}

const fn default_cache_capacity() -> usize {
    100
}

const fn default_precision_decimals() -> u32 {
    4
}

const fn default_min_interval_ms() -> u64 {
    1_000
}

const fn default_zoom() -> u8 {
    10
}

fn default_observer_host() -> String {
    String::from("0.0.0.0")
}

const fn default_observer_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    String::from("info")
}

const fn default_true() -> bool {
    true
}
