//! Mapping UTC provider samples onto local (date, hour) cells.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::config::StudyWindow;
use crate::error::{PipelineError, Result};
use crate::weather::{UtcObservation, WeatherObservation};

/// Concatenates sub-window results, sorts by instant and drops boundary
/// duplicates. The first copy of an instant wins.
pub fn merge_chunks(chunks: Vec<Vec<UtcObservation>>) -> Vec<UtcObservation> {
    let mut merged: Vec<UtcObservation> = chunks.into_iter().flatten().collect();
    merged.sort_by_key(|o| o.utc);
    merged.dedup_by_key(|o| o.utc);
    merged
}

/// Converts a sorted UTC series into one row per local hour of the window.
///
/// On a fall-back day the repeated local hour keeps the earlier UTC sample.
/// On a spring-forward day the hour that does not exist copies the sample of
/// the UTC instant just before it and is marked `filled`. Any other hole
/// fails the region.
pub fn localize(
    region: &str,
    tz: Tz,
    observations: &[UtcObservation],
    window: &StudyWindow,
) -> Result<Vec<WeatherObservation>> {
    let mut cells: BTreeMap<(NaiveDate, u32), &UtcObservation> = BTreeMap::new();
    let mut repeated = 0usize;

    for obs in observations {
        let local = obs.utc.with_timezone(&tz);
        let key = (local.date_naive(), local.hour());
        if !window.contains_date(key.0) {
            continue;
        }
        if cells.contains_key(&key) {
            repeated += 1;
            continue;
        }
        cells.insert(key, obs);
    }

    if repeated > 0 {
        debug!(region, repeated, "Discarded repeated local hours");
    }

    let mut rows: Vec<WeatherObservation> = Vec::with_capacity(window.num_days() * 24);
    for date in window.dates() {
        for hour in 0..24 {
            if let Some(obs) = cells.get(&(date, hour)) {
                rows.push(WeatherObservation::from_utc(region, date, hour, obs));
                continue;
            }

            let previous = date
                .and_hms_opt(hour, 0, 0)
                .filter(|naive| matches!(tz.from_local_datetime(naive), LocalResult::None))
                .and_then(|naive| instant_before(tz, naive))
                .and_then(|utc| observations.iter().find(|o| o.utc == utc));

            match previous {
                Some(obs) => {
                    let mut filled = WeatherObservation::from_utc(region, date, hour, obs);
                    filled.filled = true;
                    debug!(region, %date, hour, source_utc = %obs.utc, "Filled nonexistent local hour");
                    rows.push(filled);
                }
                None => {
                    return Err(PipelineError::unavailable(
                        region,
                        window.to_string(),
                        format!("no observation for local {date} hour {hour}"),
                    ));
                }
            }
        }
    }

    Ok(rows)
}

/// The UTC instant of the last local hour that exists before `naive`.
fn instant_before(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    (1..=24)
        .find_map(|back| tz.from_local_datetime(&(naive - Duration::hours(back))).latest())
        .map(|local| local.with_timezone(&Utc))
}

/// Local (date, hour) cells of the window that `rows` does not cover.
pub fn missing_hours(rows: &[WeatherObservation], window: &StudyWindow) -> Vec<(NaiveDate, u32)> {
    let present: std::collections::HashSet<_> = rows.iter().map(WeatherObservation::key).collect();
    window
        .dates()
        .flat_map(|d| (0..24).map(move |h| (d, h)))
        .filter(|key| !present.contains(key))
        .collect()
}
