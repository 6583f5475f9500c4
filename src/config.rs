//! Study configuration.
//!
//! A single TOML file describes the study windows, the regions, the cleaning
//! thresholds, the weather archive settings and where every table lives.
//! The file is parsed and validated once; the resulting [`StudyConfig`] is
//! passed by reference into each stage.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::{PipelineError, Result};

pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";
pub const DEFAULT_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

#[derive(Debug, Clone, Deserialize)]
pub struct StudyConfig {
    /// IANA timezone of the trip timestamps, used for regions without an override.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub windows: Vec<StudyWindow>,
    pub regions: Vec<RegionConfig>,
    #[serde(default)]
    pub stations: Option<StationTableConfig>,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    pub paths: PathsConfig,
}

/// A tagged, inclusive date range, e.g. a training or validation period.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StudyWindow {
    pub tag: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub bounds: Option<BoundingBox>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max && lon >= self.lon_min && lon <= self.lon_max
    }
}

/// Station metadata CSV mapping station ids to region names.
#[derive(Debug, Clone, Deserialize)]
pub struct StationTableConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub virtual_station: String,
    pub max_duration_minutes: f64,
    pub min_duration_minutes: f64,
    pub round_trip_floor_minutes: f64,
    pub focus_stations: Vec<String>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            virtual_station: "3000".to_string(),
            max_duration_minutes: 600.0,
            min_duration_minutes: 0.0,
            round_trip_floor_minutes: 15.0,
            focus_stations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    pub max_days_per_request: u32,
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
    pub concurrency: usize,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ARCHIVE_URL.to_string(),
            max_days_per_request: 92,
            retries: 3,
            retry_backoff_ms: 500,
            timeout_secs: 30,
            concurrency: 4,
        }
    }
}

/// Table locations. `{tag}` in a path is replaced by the selected window tag.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub raw_trips: Vec<PathBuf>,
    pub cleaned_trips: String,
    #[serde(default)]
    pub focus_trips: Option<String>,
    pub weather_dir: PathBuf,
    pub hourly_panel: String,
    #[serde(default)]
    pub daily_panel: Option<String>,
}

impl PathsConfig {
    pub fn resolve(template: &str, tag: &str) -> PathBuf {
        PathBuf::from(template.replace("{tag}", tag))
    }

    pub fn cleaned_trips_for(&self, tag: &str) -> PathBuf {
        Self::resolve(&self.cleaned_trips, tag)
    }

    pub fn focus_trips_for(&self, tag: &str) -> Option<PathBuf> {
        self.focus_trips.as_deref().map(|t| Self::resolve(t, tag))
    }

    pub fn hourly_panel_for(&self, tag: &str) -> PathBuf {
        Self::resolve(&self.hourly_panel, tag)
    }

    pub fn daily_panel_for(&self, tag: &str) -> Option<PathBuf> {
        self.daily_panel.as_deref().map(|t| Self::resolve(t, tag))
    }

    pub fn weather_file(&self, region: &str, tag: &str) -> PathBuf {
        self.weather_dir.join(format!("{region}_hourly_{tag}.csv"))
    }
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

impl StudyWindow {
    pub fn num_days(&self) -> usize {
        ((self.end_date - self.start_date).num_days() + 1).max(0) as usize
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start_date
            .iter_days()
            .take_while(move |d| *d <= self.end_date)
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.contains_date(ts.date())
    }

    /// Zero-based position of `date` in the window.
    pub fn date_index(&self, date: NaiveDate) -> Option<usize> {
        self.contains_date(date)
            .then(|| (date - self.start_date).num_days() as usize)
    }
}

impl std::fmt::Display for StudyWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}..={})", self.tag, self.start_date, self.end_date)
    }
}

impl StudyConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("failed to read {}: {e}", path.display()))
        })?;

        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let cfg: StudyConfig = toml::from_str(contents)
            .map_err(|e| PipelineError::config(format!("failed to parse config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        parse_timezone(&self.timezone)?;

        if self.windows.is_empty() {
            return Err(PipelineError::config("at least one [[windows]] entry is required"));
        }
        let mut tags = HashSet::new();
        for w in &self.windows {
            if w.tag.trim().is_empty() {
                return Err(PipelineError::config("window tag must not be empty"));
            }
            if !tags.insert(w.tag.as_str()) {
                return Err(PipelineError::config(format!("duplicate window tag '{}'", w.tag)));
            }
            if w.start_date > w.end_date {
                return Err(PipelineError::config(format!(
                    "window '{}' starts after it ends ({} > {})",
                    w.tag, w.start_date, w.end_date
                )));
            }
        }

        if self.regions.is_empty() {
            return Err(PipelineError::config("at least one [[regions]] entry is required"));
        }
        let mut names = HashSet::new();
        for r in &self.regions {
            if r.name.trim().is_empty() {
                return Err(PipelineError::config("region name must not be empty"));
            }
            if !names.insert(r.name.as_str()) {
                return Err(PipelineError::config(format!("duplicate region '{}'", r.name)));
            }
            if !(-90.0..=90.0).contains(&r.latitude) || !(-180.0..=180.0).contains(&r.longitude) {
                return Err(PipelineError::config(format!(
                    "region '{}' has an out-of-range center ({}, {})",
                    r.name, r.latitude, r.longitude
                )));
            }
            if let Some(tz) = &r.timezone {
                parse_timezone(tz)?;
            }
            if let Some(b) = &r.bounds {
                if b.lat_min > b.lat_max || b.lon_min > b.lon_max {
                    return Err(PipelineError::config(format!(
                        "region '{}' has an inverted bounding box",
                        r.name
                    )));
                }
            }
        }

        if self.stations.is_none() && self.regions.iter().all(|r| r.bounds.is_none()) {
            return Err(PipelineError::config(
                "trips cannot be assigned to regions: configure [stations] or region bounds",
            ));
        }

        let c = &self.cleaning;
        if c.max_duration_minutes <= 0.0 {
            return Err(PipelineError::config("cleaning.max_duration_minutes must be positive"));
        }
        if c.min_duration_minutes < 0.0 || c.min_duration_minutes >= c.max_duration_minutes {
            return Err(PipelineError::config(
                "cleaning.min_duration_minutes must be in [0, max_duration_minutes)",
            ));
        }
        if c.round_trip_floor_minutes < 0.0 {
            return Err(PipelineError::config(
                "cleaning.round_trip_floor_minutes must not be negative",
            ));
        }

        let w = &self.weather;
        if w.max_days_per_request == 0 {
            return Err(PipelineError::config("weather.max_days_per_request must be at least 1"));
        }
        if w.concurrency == 0 {
            return Err(PipelineError::config("weather.concurrency must be at least 1"));
        }
        if w.timeout_secs == 0 {
            return Err(PipelineError::config("weather.timeout_secs must be at least 1"));
        }

        Ok(())
    }

    /// Select a window by tag; without a tag the first window is used.
    pub fn window(&self, tag: Option<&str>) -> Result<&StudyWindow> {
        match tag {
            None => self
                .windows
                .first()
                .ok_or_else(|| PipelineError::config("no windows configured")),
            Some(tag) => self.windows.iter().find(|w| w.tag == tag).ok_or_else(|| {
                let known: Vec<_> = self.windows.iter().map(|w| w.tag.as_str()).collect();
                PipelineError::config(format!(
                    "unknown window '{tag}'. Configured windows: {}",
                    known.join(", ")
                ))
            }),
        }
    }

    pub fn region_timezone(&self, region: &RegionConfig) -> Result<Tz> {
        parse_timezone(region.timezone.as_deref().unwrap_or(&self.timezone))
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| PipelineError::config(format!("unknown timezone '{name}'")))
}
