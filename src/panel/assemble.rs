use std::collections::HashMap;

use chrono::Timelike;
use tracing::{debug, info, warn};

use crate::config::{StudyConfig, StudyWindow};
use crate::error::{PipelineError, Result};
use crate::panel::{CalendarFields, PanelRow};
use crate::regions::RegionResolver;
use crate::stats::{AssemblyReport, mean, round3};
use crate::trips::Trip;
use crate::weather::WeatherTable;

#[derive(Debug, Default)]
struct Bucket {
    durations: Vec<f64>,
    distances: Vec<f64>,
}

/// Builds the full grid for a window and left-joins trips and weather onto it.
///
/// Rows come out in configured region order, then date, then hour.
pub struct PanelAssembler<'a> {
    config: &'a StudyConfig,
    window: &'a StudyWindow,
    resolver: &'a RegionResolver,
}

impl<'a> PanelAssembler<'a> {
    pub fn new(config: &'a StudyConfig, window: &'a StudyWindow, resolver: &'a RegionResolver) -> Self {
        Self {
            config,
            window,
            resolver,
        }
    }

    /// Assembles the hourly panel. A region with incomplete weather fails
    /// the assembly unless `allow_partial` is set, in which case every row
    /// of that region is flagged.
    #[tracing::instrument(skip_all, fields(window = %self.window.tag, trips = trips.len(), allow_partial = allow_partial))]
    pub fn assemble(
        &self,
        trips: &[Trip],
        weather: &WeatherTable,
        allow_partial: bool,
    ) -> Result<(Vec<PanelRow>, AssemblyReport)> {
        let mut report = AssemblyReport::new(&self.window.tag);
        report.regions = self.config.regions.len();
        report.days = self.window.num_days();

        let incomplete = self.incomplete_regions(weather, allow_partial)?;
        report.incomplete_weather_regions = self
            .config
            .regions
            .iter()
            .zip(&incomplete)
            .filter(|(_, bad)| **bad)
            .map(|(r, _)| r.name.clone())
            .collect();

        let buckets = self.bucket_trips(trips, &mut report);

        let mut rows = Vec::with_capacity(report.regions * report.days * 24);
        for (ri, region) in self.config.regions.iter().enumerate() {
            for (di, date) in self.window.dates().enumerate() {
                let cal = CalendarFields::for_date(date);

                for hour in 0..24u32 {
                    let bucket = buckets.get(&(ri, di, hour));
                    let trip_count = bucket.map_or(0, |b| b.durations.len() as u32);
                    let obs = weather.get(&region.name, date, hour);
                    let missing = incomplete[ri] || obs.is_none_or(|o| o.is_missing_core());

                    if trip_count == 0 {
                        report.zero_trip_rows += 1;
                    }
                    if missing {
                        report.missing_weather_rows += 1;
                    }

                    rows.push(PanelRow {
                        region: region.name.clone(),
                        date,
                        date_id: di,
                        hour,
                        month: cal.month,
                        weekday: cal.weekday,
                        is_weekend: u8::from(cal.is_weekend),
                        trip_count,
                        avg_duration_min: bucket.and_then(|b| mean(&b.durations)).map(round3),
                        avg_distance_mi: bucket.and_then(|b| mean(&b.distances)).map(round3),
                        temperature_c: obs.and_then(|o| o.temperature_c).map(round3),
                        apparent_temperature_c: obs.and_then(|o| o.apparent_temperature_c).map(round3),
                        rel_humidity: obs.and_then(|o| o.rel_humidity).map(round3),
                        wind_speed_ms: obs.and_then(|o| o.wind_speed_ms).map(round3),
                        wind_gust_ms: obs.and_then(|o| o.wind_gust_ms).map(round3),
                        cloud_cover: obs.and_then(|o| o.cloud_cover).map(round3),
                        precip_mm: obs.and_then(|o| o.precip_mm).map(round3),
                        rain_mm: obs.and_then(|o| o.rain_mm).map(round3),
                        snow_mm: obs.and_then(|o| o.snow_mm).map(round3),
                        missing_weather_flag: u8::from(missing),
                    });
                }
            }
        }

        report.rows = rows.len();

        info!(
            rows = report.rows,
            trips_counted = report.trips_counted,
            trips_unassigned = report.trips_unassigned,
            trips_outside_window = report.trips_outside_window,
            zero_trip_pct = %format!("{:.1}", report.zero_trip_pct()),
            missing_weather_rows = report.missing_weather_rows,
            "Panel assembled"
        );

        Ok((rows, report))
    }

    /// Per configured region, whether its weather cannot be trusted.
    fn incomplete_regions(&self, weather: &WeatherTable, allow_partial: bool) -> Result<Vec<bool>> {
        let mut flags = Vec::with_capacity(self.config.regions.len());

        for region in &self.config.regions {
            let name = region.name.as_str();
            let reason = if !weather.is_complete(name) {
                weather
                    .incomplete_regions()
                    .find(|(r, _)| *r == name)
                    .map(|(_, why)| why.to_string())
            } else if weather.region_len(name) == 0 {
                Some("no weather rows".to_string())
            } else {
                None
            };

            match reason {
                Some(reason) if !allow_partial => {
                    return Err(PipelineError::unavailable(name, self.window.to_string(), reason));
                }
                Some(reason) => {
                    warn!(region = name, reason = %reason, "Flagging every row of region for missing weather");
                    flags.push(true);
                }
                None => flags.push(false),
            }
        }

        Ok(flags)
    }

    fn bucket_trips(&self, trips: &[Trip], report: &mut AssemblyReport) -> HashMap<(usize, usize, u32), Bucket> {
        let index: HashMap<&str, usize> = self
            .config
            .regions
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.as_str(), i))
            .collect();

        let mut buckets: HashMap<(usize, usize, u32), Bucket> = HashMap::new();

        for trip in trips {
            let Some(ri) = self.resolver.resolve(trip).and_then(|name| index.get(name).copied()) else {
                debug!(station = %trip.start_station, "Trip has no configured region");
                report.trips_unassigned += 1;
                continue;
            };
            let Some(di) = self.window.date_index(trip.start_time.date()) else {
                report.trips_outside_window += 1;
                continue;
            };

            let bucket = buckets.entry((ri, di, trip.start_time.hour())).or_default();
            bucket.durations.push(trip.duration_min);
            if let Some(d) = trip.distance_mi {
                bucket.distances.push(d);
            }
            report.trips_counted += 1;
        }

        if report.trips_unassigned > 0 {
            warn!(unassigned = report.trips_unassigned, "Trips excluded from the panel: region unknown");
        }

        buckets
    }
}
