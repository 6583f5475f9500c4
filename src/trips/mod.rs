//! Raw and cleaned trip records.
//!
//! [`RawTrip`] accepts both the Metro Bike export columns (`start_time`,
//! `start_station`, `start_lon`, `duration`, `bike_id`) and the Citi Bike
//! ones (`started_at`, `start_station_id`, `start_lng`, `ride_id`). Every
//! field is optional at this stage; [`RawTrip::validate`] turns a row into a
//! [`Trip`] or the reason it is unusable.

pub mod cleaner;
pub mod focus;
pub mod reader;

use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result as PipelineResult;
use crate::output::{read_records, write_records};
use crate::regions::haversine_miles;
use crate::stats::DropReason;

pub use cleaner::TripCleaner;
pub use focus::{FocusDirection, FocusTrip, StationPairCount, extract_focus, top_station_pairs};
pub use reader::{expand_inputs, scan_trip_file, scan_trip_reader};

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// A row as read from a raw trip export.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrip {
    #[serde(default, alias = "ride_id")]
    pub trip_id: Option<String>,
    #[serde(default, alias = "started_at")]
    pub start_time: Option<String>,
    #[serde(default, alias = "ended_at")]
    pub end_time: Option<String>,
    #[serde(default, alias = "start_station_id")]
    pub start_station: Option<String>,
    #[serde(default, alias = "end_station_id")]
    pub end_station: Option<String>,
    /// Minutes, as written in the export.
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub start_lat: Option<f64>,
    #[serde(default, alias = "start_lng", deserialize_with = "csv::invalid_option")]
    pub start_lon: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub end_lat: Option<f64>,
    #[serde(default, alias = "end_lng", deserialize_with = "csv::invalid_option")]
    pub end_lon: Option<f64>,
    #[serde(default)]
    pub bike_id: Option<String>,
}

/// A validated trip, one row of the cleaned trip table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub trip_id: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub start_station: String,
    pub end_station: String,
    pub duration_min: f64,
    pub distance_mi: Option<f64>,
    pub bike_id: Option<String>,
    pub start_lat: Option<f64>,
    pub start_lon: Option<f64>,
    pub end_lat: Option<f64>,
    pub end_lon: Option<f64>,
}

/// Uniqueness key of a trip: (start, end, start station, end station, bike).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TripKey {
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    start_station: String,
    end_station: String,
    bike_id: Option<String>,
}

impl Trip {
    pub fn key(&self) -> TripKey {
        TripKey {
            start_time: self.start_time,
            end_time: self.end_time,
            start_station: self.start_station.clone(),
            end_station: self.end_station.clone(),
            bike_id: self.bike_id.clone(),
        }
    }

    pub fn is_round_trip(&self) -> bool {
        self.start_station == self.end_station
    }
}

impl RawTrip {
    /// Required fields and types. When the export has a duration column
    /// every row must carry a numeric value there; only exports without the
    /// column fall back to end minus start.
    pub fn validate(self, has_duration_column: bool) -> Result<Trip, DropReason> {
        let start_time = required(self.start_time)?;
        let end_time = required(self.end_time)?;
        let start_station = required(self.start_station).map(|s| normalize_station_id(&s))?;
        let end_station = required(self.end_station).map(|s| normalize_station_id(&s))?;
        let duration = match required(self.duration) {
            Ok(d) => Some(d),
            Err(reason) if has_duration_column => return Err(reason),
            Err(_) => None,
        };

        let start_time = parse_timestamp(&start_time).ok_or(DropReason::Malformed)?;
        let end_time = parse_timestamp(&end_time).ok_or(DropReason::Malformed)?;

        let duration_min = match duration {
            Some(d) => d
                .parse::<f64>()
                .ok()
                .filter(|d| d.is_finite())
                .ok_or(DropReason::Malformed)?,
            None => (end_time - start_time).num_seconds() as f64 / 60.0,
        };

        let distance_mi = match (self.start_lat, self.start_lon, self.end_lat, self.end_lon) {
            (Some(a), Some(b), Some(c), Some(d)) => Some(haversine_miles(a, b, c, d)),
            _ => None,
        };

        Ok(Trip {
            trip_id: self.trip_id.filter(|s| !s.trim().is_empty()),
            start_time,
            end_time,
            start_station,
            end_station,
            duration_min,
            distance_mi,
            bike_id: self
                .bike_id
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            start_lat: self.start_lat,
            start_lon: self.start_lon,
            end_lat: self.end_lat,
            end_lon: self.end_lon,
        })
    }
}

fn required(field: Option<String>) -> Result<String, DropReason> {
    match field {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(DropReason::MissingField),
    }
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Station ids read through a float column come back as "4614.0".
pub fn normalize_station_id(id: &str) -> String {
    let id = id.trim();
    match id.strip_suffix(".0") {
        Some(int) if !int.is_empty() && int.bytes().all(|b| b.is_ascii_digit()) => int.to_string(),
        _ => id.to_string(),
    }
}

/// Persists the cleaned trip table.
pub fn write_cleaned(path: &Path, trips: &[Trip]) -> PipelineResult<usize> {
    let n = write_records(path, trips)?;
    info!(path = %path.display(), rows = n, "Wrote cleaned trips");
    Ok(n)
}

/// Reads a cleaned trip table written by [`write_cleaned`].
pub fn read_cleaned(path: &Path) -> PipelineResult<Vec<Trip>> {
    let (trips, _skipped) = read_records(path)?;
    info!(path = %path.display(), rows = trips.len(), "Read cleaned trips");
    Ok(trips)
}
