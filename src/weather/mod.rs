//! Hourly weather per region.
//!
//! The archive is queried in UTC ([`archive`]), sub-window requests are fanned
//! out and joined ([`fetcher`]), UTC instants are mapped onto local
//! (date, hour) cells ([`normalize`]) and the per-region tables are persisted
//! as CSV ([`store`]).

pub mod archive;
pub mod fetcher;
pub mod normalize;
pub mod store;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use archive::{ArchiveError, ArchiveSource, DateSpan, GeoPoint, OpenMeteoArchive};
pub use fetcher::WeatherFetcher;

/// Water equivalent of fresh snow: 7 cm of snow ≈ 10 mm of water.
const SNOW_CM_TO_MM: f64 = 10.0 / 7.0;

/// Provider variables for one hour. Any of them may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HourlyValues {
    pub temperature_c: Option<f64>,
    pub apparent_temperature_c: Option<f64>,
    pub rel_humidity: Option<f64>,
    pub precip_mm: Option<f64>,
    pub rain_mm: Option<f64>,
    pub snowfall_cm: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub wind_gust_ms: Option<f64>,
    pub cloud_cover: Option<f64>,
}

impl HourlyValues {
    /// Snow water equivalent from snowfall, else the non-rain part of precipitation.
    pub fn snow_mm(&self) -> Option<f64> {
        match (self.snowfall_cm, self.precip_mm, self.rain_mm) {
            (Some(cm), _, _) => Some(cm * SNOW_CM_TO_MM),
            (None, Some(precip), Some(rain)) => Some((precip - rain).max(0.0)),
            _ => None,
        }
    }
}

/// One provider sample, timestamped in UTC.
#[derive(Debug, Clone, PartialEq)]
pub struct UtcObservation {
    pub utc: DateTime<Utc>,
    pub values: HourlyValues,
}

/// One row of a region's hourly weather table, keyed by local date and hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub region: String,
    pub date: NaiveDate,
    pub hour: u32,
    pub source_utc: DateTime<Utc>,
    pub temperature_c: Option<f64>,
    pub apparent_temperature_c: Option<f64>,
    pub rel_humidity: Option<f64>,
    pub precip_mm: Option<f64>,
    pub rain_mm: Option<f64>,
    pub snowfall_cm: Option<f64>,
    pub snow_mm: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub wind_gust_ms: Option<f64>,
    pub cloud_cover: Option<f64>,
    /// Copied from the previous local hour because this one does not exist (DST gap).
    pub filled: bool,
}

impl WeatherObservation {
    pub fn from_utc(region: &str, date: NaiveDate, hour: u32, obs: &UtcObservation) -> Self {
        let v = &obs.values;
        WeatherObservation {
            region: region.to_string(),
            date,
            hour,
            source_utc: obs.utc,
            temperature_c: v.temperature_c,
            apparent_temperature_c: v.apparent_temperature_c,
            rel_humidity: v.rel_humidity,
            precip_mm: v.precip_mm,
            rain_mm: v.rain_mm,
            snowfall_cm: v.snowfall_cm,
            snow_mm: v.snow_mm(),
            wind_speed_ms: v.wind_speed_ms,
            wind_gust_ms: v.wind_gust_ms,
            cloud_cover: v.cloud_cover,
            filled: false,
        }
    }

    pub fn key(&self) -> (NaiveDate, u32) {
        (self.date, self.hour)
    }

    /// Temperature and precipitation are what the models cannot do without.
    pub fn is_missing_core(&self) -> bool {
        self.temperature_c.is_none() || self.precip_mm.is_none()
    }
}

/// Weather for every configured region, plus the regions whose series is
/// known to be incomplete.
#[derive(Debug, Default, Clone)]
pub struct WeatherTable {
    regions: HashMap<String, HashMap<(NaiveDate, u32), WeatherObservation>>,
    incomplete: BTreeMap<String, String>,
}

impl WeatherTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a region's observations; the first row for a (date, hour) wins.
    pub fn insert_region(&mut self, region: &str, observations: Vec<WeatherObservation>) {
        let cells = self.regions.entry(region.to_string()).or_default();
        for obs in observations {
            cells.entry(obs.key()).or_insert(obs);
        }
    }

    pub fn mark_incomplete(&mut self, region: &str, reason: impl Into<String>) {
        self.incomplete.insert(region.to_string(), reason.into());
    }

    pub fn get(&self, region: &str, date: NaiveDate, hour: u32) -> Option<&WeatherObservation> {
        self.regions.get(region)?.get(&(date, hour))
    }

    pub fn is_complete(&self, region: &str) -> bool {
        !self.incomplete.contains_key(region)
    }

    pub fn incomplete_regions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.incomplete.iter().map(|(r, why)| (r.as_str(), why.as_str()))
    }

    pub fn region_len(&self, region: &str) -> usize {
        self.regions.get(region).map_or(0, HashMap::len)
    }

    /// A region's rows in (date, hour) order.
    pub fn region_rows(&self, region: &str) -> Vec<&WeatherObservation> {
        let mut rows: Vec<_> = self
            .regions
            .get(region)
            .map(|cells| cells.values().collect())
            .unwrap_or_default();
        rows.sort_by_key(|o| o.key());
        rows
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn values(temperature_c: f64) -> HourlyValues {
        HourlyValues {
            temperature_c: Some(temperature_c),
            apparent_temperature_c: Some(temperature_c),
            rel_humidity: Some(50.0),
            precip_mm: Some(0.0),
            rain_mm: Some(0.0),
            snowfall_cm: Some(0.0),
            wind_speed_ms: Some(2.0),
            wind_gust_ms: Some(4.0),
            cloud_cover: Some(10.0),
        }
    }

    pub(crate) fn observation(region: &str, date: NaiveDate, hour: u32, temperature_c: f64) -> WeatherObservation {
        let utc = Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap());
        WeatherObservation::from_utc(region, date, hour, &UtcObservation { utc, values: values(temperature_c) })
    }

    #[test]
    fn test_snow_from_snowfall() {
        let v = HourlyValues {
            snowfall_cm: Some(7.0),
            precip_mm: Some(3.0),
            rain_mm: Some(1.0),
            ..Default::default()
        };
        assert!((v.snow_mm().unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_snow_fallback_to_precip_minus_rain() {
        let v = HourlyValues {
            precip_mm: Some(3.0),
            rain_mm: Some(1.0),
            ..Default::default()
        };
        assert_eq!(v.snow_mm(), Some(2.0));

        let v = HourlyValues {
            precip_mm: Some(1.0),
            rain_mm: Some(1.5),
            ..Default::default()
        };
        assert_eq!(v.snow_mm(), Some(0.0));

        assert_eq!(HourlyValues::default().snow_mm(), None);
    }

    #[test]
    fn test_table_first_row_wins() {
        let date = NaiveDate::from_ymd_opt(2024, 11, 3).unwrap();
        let mut table = WeatherTable::new();
        table.insert_region("DTLA", vec![observation("DTLA", date, 1, 15.0), observation("DTLA", date, 1, 99.0)]);

        assert_eq!(table.region_len("DTLA"), 1);
        assert_eq!(table.get("DTLA", date, 1).unwrap().temperature_c, Some(15.0));
        assert!(table.get("DTLA", date, 2).is_none());
        assert!(table.get("Westside", date, 1).is_none());
    }

    #[test]
    fn test_table_incomplete_regions() {
        let mut table = WeatherTable::new();
        table.mark_incomplete("NoHo", "status 503");

        assert!(!table.is_complete("NoHo"));
        assert!(table.is_complete("DTLA"));
        assert_eq!(table.incomplete_regions().collect::<Vec<_>>(), vec![("NoHo", "status 503")]);
    }
}
