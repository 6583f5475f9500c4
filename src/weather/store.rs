//! Per-region weather tables on disk: `{weather_dir}/{region}_hourly_{tag}.csv`.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{StudyConfig, StudyWindow};
use crate::error::{PipelineError, Result};
use crate::output::{read_records, write_records};
use crate::weather::normalize::missing_hours;
use crate::weather::{WeatherObservation, WeatherTable};

pub fn write_region_weather(path: &Path, rows: &[&WeatherObservation]) -> Result<usize> {
    write_records(path, rows.iter().copied())
}

pub fn read_region_weather(path: &Path) -> Result<(Vec<WeatherObservation>, usize)> {
    read_records(path)
}

/// Writes one file per region for which the table holds rows.
#[tracing::instrument(skip_all, fields(window = %window.tag))]
pub fn save_weather_table(
    config: &StudyConfig,
    window: &StudyWindow,
    table: &WeatherTable,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    for region in &config.regions {
        let rows = table.region_rows(&region.name);
        if rows.is_empty() {
            warn!(region = %region.name, "No weather rows to write");
            continue;
        }

        let path = config.paths.weather_file(&region.name, &window.tag);
        let n = write_region_weather(&path, &rows)?;
        info!(region = %region.name, rows = n, path = %path.display(), "Saved weather");
        written.push(path);
    }

    Ok(written)
}

/// Loads every configured region's weather for the window.
///
/// A missing file fails the load unless `allow_partial` is set, in which case
/// the region is marked incomplete. Unreadable rows are skipped, and a region
/// whose rows do not cover every local hour of the window is marked
/// incomplete.
#[tracing::instrument(skip_all, fields(window = %window.tag, allow_partial = allow_partial))]
pub fn load_weather_table(
    config: &StudyConfig,
    window: &StudyWindow,
    allow_partial: bool,
) -> Result<WeatherTable> {
    let mut table = WeatherTable::new();

    for region in &config.regions {
        let path = config.paths.weather_file(&region.name, &window.tag);
        let (mut rows, skipped) = match read_region_weather(&path) {
            Ok(loaded) => loaded,
            Err(PipelineError::MissingInput { path }) if allow_partial => {
                warn!(region = %region.name, path = %path.display(), "No saved weather for region");
                table.mark_incomplete(&region.name, format!("no weather file at {}", path.display()));
                continue;
            }
            Err(e) => return Err(e),
        };

        rows.retain(|r| r.region == region.name && window.contains_date(r.date));

        let missing = missing_hours(&rows, window);
        if skipped > 0 || !missing.is_empty() {
            warn!(
                region = %region.name,
                skipped,
                missing_hours = missing.len(),
                "Weather table does not cover the window"
            );
        }
        if let Some((date, hour)) = missing.first() {
            table.mark_incomplete(
                &region.name,
                format!("{} local hours missing, first {date} hour {hour}", missing.len()),
            );
        }

        table.insert_region(&region.name, rows);
    }

    Ok(table)
}
