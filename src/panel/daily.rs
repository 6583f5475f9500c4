use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::panel::PanelRow;
use crate::stats::{mean, round3};

/// One (region, date) row of the daily roll-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRow {
    pub region: String,
    pub date: NaiveDate,
    pub date_id: usize,
    pub month: u32,
    pub weekday: u32,
    pub is_weekend: u8,
    pub trip_count: u32,
    pub mean_temperature_c: Option<f64>,
    pub max_wind_speed_ms: Option<f64>,
    pub precip_mm: Option<f64>,
    pub rain_mm: Option<f64>,
    pub snow_mm: Option<f64>,
    pub missing_weather_hours: u32,
}

/// Rolls an hourly panel up per (region, date). Expects the hourly rows in
/// panel order, i.e. the hours of a day are contiguous.
pub fn daily_panel(hourly: &[PanelRow]) -> Vec<DailyRow> {
    hourly
        .chunk_by(|a, b| a.region == b.region && a.date == b.date)
        .map(|hours| {
            let first = &hours[0];
            let temps: Vec<f64> = hours.iter().filter_map(|h| h.temperature_c).collect();

            DailyRow {
                region: first.region.clone(),
                date: first.date,
                date_id: first.date_id,
                month: first.month,
                weekday: first.weekday,
                is_weekend: first.is_weekend,
                trip_count: hours.iter().map(|h| h.trip_count).sum(),
                mean_temperature_c: mean(&temps).map(round3),
                max_wind_speed_ms: hours
                    .iter()
                    .filter_map(|h| h.wind_speed_ms)
                    .reduce(f64::max),
                precip_mm: sum_present(hours.iter().map(|h| h.precip_mm)),
                rain_mm: sum_present(hours.iter().map(|h| h.rain_mm)),
                snow_mm: sum_present(hours.iter().map(|h| h.snow_mm)),
                missing_weather_hours: hours.iter().map(|h| u32::from(h.missing_weather_flag)).sum(),
            }
        })
        .collect()
}

/// Sum of the present values; `None` when every value is missing.
fn sum_present(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values.flatten().reduce(|a, b| a + b).map(round3)
}
