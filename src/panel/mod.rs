//! The region × date × hour panel and its daily roll-up.

pub mod assemble;
pub mod calendar;
pub mod daily;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use assemble::PanelAssembler;
pub use calendar::CalendarFields;
pub use daily::{DailyRow, daily_panel};

/// One row of the hourly panel. Column order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    pub region: String,
    pub date: NaiveDate,
    pub date_id: usize,
    pub hour: u32,
    pub month: u32,
    pub weekday: u32,
    pub is_weekend: u8,
    pub trip_count: u32,
    pub avg_duration_min: Option<f64>,
    pub avg_distance_mi: Option<f64>,
    pub temperature_c: Option<f64>,
    pub apparent_temperature_c: Option<f64>,
    pub rel_humidity: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub wind_gust_ms: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub precip_mm: Option<f64>,
    pub rain_mm: Option<f64>,
    pub snow_mm: Option<f64>,
    pub missing_weather_flag: u8,
}

impl PanelRow {
    pub fn key(&self) -> (&str, NaiveDate, u32) {
        (&self.region, self.date, self.hour)
    }
}
