//! Client for the historical track endpoint.
//!
//! The endpoint is `GET {base_url}/api/history?train_id=..&from=..&to=..`
//! and answers with a JSON array of [`HistoryPoint`]s ordered by timestamp.
//! `from` and `to` are optional ISO-8601 datetimes; the client always
//! sends them normalized to UTC (`2024-01-01T10:00:00Z`).

use std::fmt::Display;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use tracing::{debug, warn};
use trainwatch_core::config::HistoryConfig;
use trainwatch_geo::{StopThresholds, build_report};
use trainwatch_types::{EntityId, HistoryPoint, HistoryReport};

use crate::error::HttpError;

/// Accepted naive datetime layouts, tried in order. `%.f` also matches an
/// absent fraction.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const MS_PER_HOUR: i64 = 3_600_000;

/// A validated historical query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Entity whose track is requested.
    pub train_id: EntityId,
    /// Inclusive lower bound in ms since the epoch; unbounded when `None`.
    pub from_ms: Option<i64>,
    /// Inclusive upper bound in ms since the epoch; unbounded when `None`.
    pub to_ms: Option<i64>,
}

impl HistoryQuery {
    /// Query the whole stored track of `train_id`.
    pub fn new(train_id: impl Into<EntityId>) -> Self {
        Self {
            train_id: train_id.into(),
            from_ms: None,
            to_ms: None,
        }
    }

    /// Query the last `hours` hours ending at `now_ms`.
    pub fn range_last_hours(train_id: impl Into<EntityId>, hours: u32, now_ms: i64) -> Self {
        let span = i64::from(hours).saturating_mul(MS_PER_HOUR);
        Self {
            train_id: train_id.into(),
            from_ms: Some(now_ms.saturating_sub(span)),
            to_ms: Some(now_ms),
        }
    }

    /// Build a query from raw request parameters.
    ///
    /// `train_id` is required and must not be blank. Empty `from`/`to`
    /// strings count as absent. Naive datetimes are read in `tz`.
    pub fn from_params<Tz: TimeZone>(
        train_id: Option<&str>,
        from: Option<&str>,
        to: Option<&str>,
        tz: &Tz,
    ) -> Result<Self, HttpError> {
        let train_id = train_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| HttpError::InvalidQuery {
                field: "train_id",
                reason: String::from("a train id is required"),
            })?;

        let bound = |field: &'static str, raw: Option<&str>| {
            raw.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_time_param(field, s, tz))
                .transpose()
        };

        Ok(Self {
            train_id: EntityId::new(train_id),
            from_ms: bound("from", from)?,
            to_ms: bound("to", to)?,
        })
    }

    /// Query string pairs sent upstream.
    fn upstream_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("train_id", self.train_id.as_str().to_owned())];
        if let Some(from) = self.from_ms.and_then(iso_utc) {
            params.push(("from", from));
        }
        if let Some(to) = self.to_ms.and_then(iso_utc) {
            params.push(("to", to));
        }
        params
    }
}

/// Parse a `from`/`to` parameter into milliseconds since the epoch.
///
/// Accepts RFC 3339 (`2024-01-01T10:00:00Z`, `...+05:30`), the
/// `datetime-local` shape `2024-01-01T10:00` with or without seconds, a
/// trailing `Z` on either, and a bare date (midnight). Values without an
/// offset are local to `tz`.
pub fn parse_time_param<Tz: TimeZone>(field: &'static str, raw: &str, tz: &Tz) -> Result<i64, HttpError> {
    let raw = raw.trim();
    let invalid = || HttpError::InvalidQuery {
        field,
        reason: format!("invalid time format: {raw}"),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }

    if let Some(utc) = raw.strip_suffix('Z') {
        return parse_naive(utc)
            .map(|naive| naive.and_utc().timestamp_millis())
            .ok_or_else(invalid);
    }

    let naive = parse_naive(raw).ok_or_else(invalid)?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(invalid)
}

fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn iso_utc(ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// HTTP client for the history endpoint.
#[derive(Debug, Clone)]
pub struct HistoryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HistoryClient {
    /// Build a client for `config.base_url` with the configured timeout.
    pub fn new(config: &HistoryConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|source| HttpError::Client { source })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Full URL of the history endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/api/history", self.base_url)
    }

    /// Fetch the raw track. An empty array is a valid, empty result.
    pub async fn fetch(&self, query: &HistoryQuery) -> Result<Vec<HistoryPoint>, HttpError> {
        let url = self.endpoint();
        let response = self
            .client
            .get(&url)
            .query(&query.upstream_params())
            .send()
            .await
            .map_err(|source| HttpError::Request { source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            warn!(train = %query.train_id, %status, "History endpoint returned an error");
            return Err(HttpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let points: Vec<HistoryPoint> = response
            .json()
            .await
            .map_err(|source| HttpError::Decode { source })?;
        debug!(train = %query.train_id, points = points.len(), "History fetched");
        Ok(points)
    }

    /// Fetch the track and annotate it with detected stops.
    pub async fn report<Tz>(
        &self,
        query: &HistoryQuery,
        thresholds: &StopThresholds,
        tz: &Tz,
    ) -> Result<HistoryReport, HttpError>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let points = self.fetch(query).await?;
        Ok(build_report(query.train_id.clone(), &points, thresholds, tz))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::FixedOffset;

    use super::*;

    #[test]
    fn datetime_local_shapes_parse() {
        let expected = 1_704_103_200_000; // 2024-01-01T10:00:00Z
        for raw in [
            "2024-01-01T10:00",
            "2024-01-01T10:00:00",
            "2024-01-01T10:00:00.000",
            "2024-01-01 10:00",
            "2024-01-01T10:00:00Z",
            "2024-01-01T10:00Z",
            "2024-01-01T15:30:00+05:30",
        ] {
            assert_eq!(parse_time_param("from", raw, &Utc).unwrap(), expected, "{raw}");
        }
        assert_eq!(
            parse_time_param("from", "2024-01-01", &Utc).unwrap(),
            1_704_067_200_000
        );
    }

    #[test]
    fn naive_times_are_local_to_the_zone() {
        let ist = FixedOffset::east_opt(19_800).unwrap();
        assert_eq!(
            parse_time_param("to", "2024-01-01T15:30", &ist).unwrap(),
            1_704_103_200_000
        );
        // An explicit offset ignores the zone.
        assert_eq!(
            parse_time_param("to", "2024-01-01T10:00:00Z", &ist).unwrap(),
            1_704_103_200_000
        );
    }

    #[test]
    fn bad_times_name_their_field() {
        let err = parse_time_param("to", "yesterday", &Utc).unwrap_err();
        assert!(err.is_invalid_query());
        assert_eq!(err.to_string(), "invalid 'to': invalid time format: yesterday");
    }

    #[test]
    fn params_require_a_train_id() {
        for id in [None, Some(""), Some("   ")] {
            let err = HistoryQuery::from_params(id, None, None, &Utc).unwrap_err();
            assert!(matches!(err, HttpError::InvalidQuery { field: "train_id", .. }));
        }
    }

    #[test]
    fn empty_bounds_are_absent() {
        let q = HistoryQuery::from_params(Some(" 12951 "), Some(""), Some("2024-01-01T10:00"), &Utc).unwrap();
        assert_eq!(q.train_id.as_str(), "12951");
        assert_eq!(q.from_ms, None);
        assert_eq!(q.to_ms, Some(1_704_103_200_000));
    }

    #[test]
    fn last_hours_range() {
        let now = 1_704_103_200_000;
        let q = HistoryQuery::range_last_hours("a", 6, now);
        assert_eq!(q.from_ms, Some(now - 6 * 3_600_000));
        assert_eq!(q.to_ms, Some(now));
    }

    #[test]
    fn upstream_params_are_utc_iso() {
        let mut q = HistoryQuery::new("a");
        assert_eq!(q.upstream_params(), vec![("train_id", String::from("a"))]);

        q.from_ms = Some(1_704_103_200_000);
        q.to_ms = Some(1_704_106_800_000);
        assert_eq!(
            q.upstream_params(),
            vec![
                ("train_id", String::from("a")),
                ("from", String::from("2024-01-01T10:00:00Z")),
                ("to", String::from("2024-01-01T11:00:00Z")),
            ]
        );
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let config = HistoryConfig {
            base_url: String::from("http://history.local:8000/"),
            request_timeout_ms: 1_000,
        };
        let client = HistoryClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://history.local:8000/api/history");
    }
}
