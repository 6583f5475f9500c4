//! Client for the Open-Meteo historical weather archive.
//!
//! Requests are always made in UTC with unix timestamps; conversion to local
//! time happens in [`crate::weather::normalize`].

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use reqwest::{Method, Request, Url};
use serde::Deserialize;
use thiserror::Error;

use crate::fetch::HttpClient;
use crate::weather::{HourlyValues, UtcObservation};

/// Requested hourly variables, in the order they are read back.
pub const HOURLY_VARIABLES: &[&str] = &[
    "temperature_2m",
    "apparent_temperature",
    "relative_humidity_2m",
    "precipitation",
    "rain",
    "snowfall",
    "wind_speed_10m",
    "wind_gusts_10m",
    "cloud_cover",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Contiguous, non-overlapping sub-spans of at most `max_days` days each.
    pub fn split(&self, max_days: u32) -> Vec<DateSpan> {
        let step = u64::from(max_days.max(1)) - 1;
        let mut spans = Vec::new();
        let mut start = self.start;

        while start <= self.end {
            let end = start
                .checked_add_days(Days::new(step))
                .map_or(self.end, |d| d.min(self.end));
            spans.push(DateSpan { start, end });

            match end.succ_opt() {
                Some(next) => start = next,
                None => break,
            }
        }

        spans
    }

    /// Widens the span by `days` on both sides.
    pub fn widen(&self, days: u64) -> DateSpan {
        DateSpan {
            start: self.start.checked_sub_days(Days::new(days)).unwrap_or(self.start),
            end: self.end.checked_add_days(Days::new(days)).unwrap_or(self.end),
        }
    }
}

impl std::fmt::Display for DateSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("archive rejected the request: {0}")]
    Rejected(String),

    #[error("failed to decode archive response: {0}")]
    Decode(String),

    #[error("archive response is inconsistent: {0}")]
    Shape(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("invalid archive url: {0}")]
    Url(String),
}

/// Anything that can return hourly UTC observations for a point and a span.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    async fn hourly(&self, point: GeoPoint, span: DateSpan) -> Result<Vec<UtcObservation>, ArchiveError>;
}

pub struct OpenMeteoArchive<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> OpenMeteoArchive<C> {
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn request_url(&self, point: GeoPoint, span: DateSpan) -> Result<Url, ArchiveError> {
        let params = [
            ("latitude", point.latitude.to_string()),
            ("longitude", point.longitude.to_string()),
            ("start_date", span.start.to_string()),
            ("end_date", span.end.to_string()),
            ("hourly", HOURLY_VARIABLES.join(",")),
            ("timezone", "GMT".to_string()),
            ("timeformat", "unixtime".to_string()),
            ("wind_speed_unit", "ms".to_string()),
        ];
        Url::parse_with_params(&self.base_url, &params).map_err(|e| ArchiveError::Url(e.to_string()))
    }
}

#[async_trait]
impl<C: HttpClient> ArchiveSource for OpenMeteoArchive<C> {
    #[tracing::instrument(skip(self), fields(span = %span))]
    async fn hourly(&self, point: GeoPoint, span: DateSpan) -> Result<Vec<UtcObservation>, ArchiveError> {
        let url = self.request_url(point, span)?;
        let resp = self.client.execute(Request::new(Method::GET, url)).await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(ArchiveError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        parse_archive_body(&body)
    }
}

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    hourly: Option<ArchiveHourly>,
}

#[derive(Debug, Deserialize)]
struct ArchiveHourly {
    time: Vec<i64>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    apparent_temperature: Vec<Option<f64>>,
    #[serde(default)]
    relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
    #[serde(default)]
    rain: Vec<Option<f64>>,
    #[serde(default)]
    snowfall: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    wind_gusts_10m: Vec<Option<f64>>,
    #[serde(default)]
    cloud_cover: Vec<Option<f64>>,
}

/// Decodes an archive JSON body. Every variable series must line up with `time`.
pub fn parse_archive_body(body: &str) -> Result<Vec<UtcObservation>, ArchiveError> {
    let parsed: ArchiveResponse =
        serde_json::from_str(body).map_err(|e| ArchiveError::Decode(e.to_string()))?;

    if parsed.error {
        return Err(ArchiveError::Rejected(
            parsed.reason.unwrap_or_else(|| "no reason given".to_string()),
        ));
    }

    let hourly = parsed
        .hourly
        .ok_or_else(|| ArchiveError::Shape("response has no hourly block".to_string()))?;
    let n = hourly.time.len();

    let series = [
        ("temperature_2m", &hourly.temperature_2m),
        ("apparent_temperature", &hourly.apparent_temperature),
        ("relative_humidity_2m", &hourly.relative_humidity_2m),
        ("precipitation", &hourly.precipitation),
        ("rain", &hourly.rain),
        ("snowfall", &hourly.snowfall),
        ("wind_speed_10m", &hourly.wind_speed_10m),
        ("wind_gusts_10m", &hourly.wind_gusts_10m),
        ("cloud_cover", &hourly.cloud_cover),
    ];
    for (name, values) in series {
        if values.len() != n {
            return Err(ArchiveError::Shape(format!(
                "{name} has {} values for {n} timestamps",
                values.len()
            )));
        }
    }

    hourly
        .time
        .iter()
        .enumerate()
        .map(|(i, &ts)| {
            let utc = DateTime::<Utc>::from_timestamp(ts, 0)
                .ok_or_else(|| ArchiveError::Shape(format!("timestamp {ts} out of range")))?;
            Ok(UtcObservation {
                utc,
                values: HourlyValues {
                    temperature_c: hourly.temperature_2m[i],
                    apparent_temperature_c: hourly.apparent_temperature[i],
                    rel_humidity: hourly.relative_humidity_2m[i],
                    precip_mm: hourly.precipitation[i],
                    rain_mm: hourly.rain[i],
                    snowfall_cm: hourly.snowfall[i],
                    wind_speed_ms: hourly.wind_speed_10m[i],
                    wind_gust_ms: hourly.wind_gusts_10m[i],
                    cloud_cover: hourly.cloud_cover[i],
                },
            })
        })
        .collect()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;
    use std::time::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_split_is_contiguous_and_bounded() {
        let span = DateSpan::new(date(2024, 9, 22), date(2025, 9, 23));
        let parts = span.split(92);

        assert_eq!(parts.first().unwrap().start, span.start);
        assert_eq!(parts.last().unwrap().end, span.end);
        for pair in parts.windows(2) {
            assert_eq!(pair[0].end.succ_opt().unwrap(), pair[1].start);
        }
        for p in &parts {
            assert!((p.end - p.start).num_days() < 92);
        }
        let total: i64 = parts.iter().map(|p| (p.end - p.start).num_days() + 1).sum();
        assert_eq!(total, (span.end - span.start).num_days() + 1);
    }

    #[test]
    fn test_split_single_day_chunks() {
        let span = DateSpan::new(date(2024, 11, 2), date(2024, 11, 4));
        let parts = span.split(1);
        assert_eq!(
            parts,
            vec![
                DateSpan::new(date(2024, 11, 2), date(2024, 11, 2)),
                DateSpan::new(date(2024, 11, 3), date(2024, 11, 3)),
                DateSpan::new(date(2024, 11, 4), date(2024, 11, 4)),
            ]
        );
    }

    #[test]
    fn test_widen() {
        let span = DateSpan::new(date(2024, 11, 2), date(2024, 11, 4)).widen(1);
        assert_eq!(span, DateSpan::new(date(2024, 11, 1), date(2024, 11, 5)));
    }

    #[test]
    fn test_request_url() {
        let client = BasicClient::with_timeout(Duration::from_secs(5)).unwrap();
        let archive = OpenMeteoArchive::new(client, crate::config::DEFAULT_ARCHIVE_URL);
        let url = archive
            .request_url(
                GeoPoint { latitude: 34.022449, longitude: -118.438332 },
                DateSpan::new(date(2024, 9, 22), date(2024, 12, 22)),
            )
            .unwrap();

        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(url.host_str(), Some("archive-api.open-meteo.com"));
        assert_eq!(query["latitude"], "34.022449");
        assert_eq!(query["start_date"], "2024-09-22");
        assert_eq!(query["end_date"], "2024-12-22");
        assert_eq!(query["timezone"], "GMT");
        assert_eq!(query["timeformat"], "unixtime");
        assert!(query["hourly"].contains("snowfall"));
    }

    #[test]
    fn test_parse_archive_body() {
        let body = r#"{
            "latitude": 34.02, "longitude": -118.44, "utc_offset_seconds": 0,
            "hourly": {
                "time": [1730592000, 1730595600],
                "temperature_2m": [14.2, null],
                "apparent_temperature": [13.0, 12.5],
                "relative_humidity_2m": [80, 82],
                "precipitation": [0.0, 0.4],
                "rain": [0.0, 0.4],
                "snowfall": [0.0, 0.0],
                "wind_speed_10m": [1.5, 2.0],
                "wind_gusts_10m": [3.0, 4.1],
                "cloud_cover": [20, 100]
            }
        }"#;

        let obs = parse_archive_body(body).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].utc.to_rfc3339(), "2024-11-03T00:00:00+00:00");
        assert_eq!(obs[0].values.temperature_c, Some(14.2));
        assert_eq!(obs[1].values.temperature_c, None);
        assert_eq!(obs[1].values.precip_mm, Some(0.4));
        assert_eq!(obs[1].values.cloud_cover, Some(100.0));
    }

    #[test]
    fn test_parse_length_mismatch() {
        let body = r#"{"hourly": {"time": [1730592000, 1730595600], "temperature_2m": [14.2]}}"#;
        let err = parse_archive_body(body).unwrap_err();
        assert!(matches!(err, ArchiveError::Shape(_)));
        assert!(err.to_string().contains("temperature_2m has 1 values"));
    }

    #[test]
    fn test_parse_provider_error() {
        let body = r#"{"error": true, "reason": "Parameter 'start_date' is out of allowed range"}"#;
        let err = parse_archive_body(body).unwrap_err();
        assert!(matches!(err, ArchiveError::Rejected(_)));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(500);
        assert_eq!(truncate_body(&long).len(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
