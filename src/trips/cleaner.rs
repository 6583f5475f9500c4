use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{CleaningConfig, StudyWindow};
use crate::error::Result;
use crate::stats::{CleaningReport, DropReason};
use crate::trips::{RawTrip, Trip, TripKey, scan_trip_file};

/// A row that passed rules 1 and 2. Whether it survives depends on the
/// duplicate check, which only the in-order fold can make.
#[derive(Debug)]
enum Screened {
    Passed(Trip),
    Failed(TripKey, DropReason),
}

/// One raw file after the per-row rules.
#[derive(Debug)]
struct TripBatch {
    source: PathBuf,
    report: CleaningReport,
    screened: Vec<Screened>,
}

impl TripBatch {
    fn new(source: &Path) -> Self {
        TripBatch {
            source: source.to_path_buf(),
            report: CleaningReport {
                files: 1,
                ..Default::default()
            },
            screened: Vec::new(),
        }
    }

    fn count_malformed(&mut self, malformed: usize) {
        self.report.rows_seen += malformed;
        self.report.malformed += malformed;
    }
}

/// Applies the cleaning rules, in order, to the concatenation of raw files:
///
/// 1. required fields present and parseable
/// 2. neither station is the virtual placeholder
/// 3. first occurrence of each (start, end, stations, bike) key
/// 4. duration positive, at least the floor and at most the ceiling
/// 5. same-station trips at least the round-trip floor
/// 6. start inside the study window
///
/// A record claims its uniqueness key as soon as it passes rule 2, so a later
/// copy is a duplicate even when the first copy fails a later rule.
#[derive(Debug, Clone)]
pub struct TripCleaner {
    config: CleaningConfig,
    window: StudyWindow,
}

impl TripCleaner {
    pub fn new(config: &CleaningConfig, window: &StudyWindow) -> Self {
        Self {
            config: config.clone(),
            window: window.clone(),
        }
    }

    /// Screens every file on the blocking pool and folds the batches in input
    /// order as each task completes.
    #[tracing::instrument(skip_all, fields(window = %self.window.tag, files = paths.len()))]
    pub async fn clean_files(&self, paths: &[PathBuf]) -> Result<(Vec<Trip>, CleaningReport)> {
        let cleaner = Arc::new(self.clone());
        let tasks: Vec<_> = paths
            .iter()
            .cloned()
            .map(|path| {
                let cleaner = Arc::clone(&cleaner);
                tokio::task::spawn_blocking(move || cleaner.screen_file(&path))
            })
            .collect();

        let mut report = CleaningReport::new(&self.window.tag);
        let mut seen: HashSet<TripKey> = HashSet::new();
        let mut kept = Vec::new();

        for task in tasks {
            let batch = task.await.map_err(std::io::Error::other)??;
            self.absorb(batch, &mut seen, &mut kept, &mut report);
        }

        Ok(self.finish(kept, report))
    }

    fn screen_file(&self, path: &Path) -> Result<TripBatch> {
        let mut batch = TripBatch::new(path);
        let malformed = scan_trip_file(path, |raw, has_duration| {
            self.screen_row(&mut batch, raw, has_duration)
        })?;
        batch.count_malformed(malformed);
        Ok(batch)
    }

    fn screen_row(&self, batch: &mut TripBatch, raw: RawTrip, has_duration: bool) {
        batch.report.rows_seen += 1;

        let trip = match raw.validate(has_duration) {
            Ok(trip) => trip,
            Err(reason) => {
                batch.report.record_drop(reason);
                return;
            }
        };

        let virtual_station = self.config.virtual_station.as_str();
        if trip.start_station == virtual_station || trip.end_station == virtual_station {
            batch.report.record_drop(DropReason::VirtualStation);
            return;
        }

        let screened = match self.check_duration(&trip).and_then(|()| self.check_window(&trip)) {
            Ok(()) => Screened::Passed(trip),
            Err(reason) => Screened::Failed(trip.key(), reason),
        };
        batch.screened.push(screened);
    }

    /// Settles duplicates for one batch against every earlier batch.
    fn absorb(
        &self,
        batch: TripBatch,
        seen: &mut HashSet<TripKey>,
        kept: &mut Vec<Trip>,
        report: &mut CleaningReport,
    ) {
        report.merge(&batch.report);
        let before = kept.len();

        for screened in batch.screened {
            let (key, outcome) = match screened {
                Screened::Passed(trip) => (trip.key(), Ok(trip)),
                Screened::Failed(key, reason) => (key, Err(reason)),
            };
            if !seen.insert(key) {
                report.record_drop(DropReason::Duplicate);
                continue;
            }
            match outcome {
                Ok(trip) => kept.push(trip),
                Err(reason) => report.record_drop(reason),
            }
        }

        debug!(
            source = %batch.source.display(),
            rows_seen = batch.report.rows_seen,
            kept = kept.len() - before,
            "Folded trip file"
        );
    }

    fn finish(&self, kept: Vec<Trip>, mut report: CleaningReport) -> (Vec<Trip>, CleaningReport) {
        report.rows_kept = kept.len();

        info!(
            rows_seen = report.rows_seen,
            rows_kept = report.rows_kept,
            kept_pct = %format!("{:.1}", report.kept_pct()),
            malformed = report.malformed,
            missing_field = report.missing_field,
            virtual_station = report.virtual_station,
            duplicate = report.duplicate,
            non_positive_duration = report.non_positive_duration,
            below_min_duration = report.below_min_duration,
            exceeds_max_duration = report.exceeds_max_duration,
            short_round_trip = report.short_round_trip,
            outside_window = report.outside_window,
            "Cleaning finished"
        );

        (kept, report)
    }

    fn check_duration(&self, trip: &Trip) -> std::result::Result<(), DropReason> {
        let d = trip.duration_min;

        if d <= 0.0 {
            return Err(DropReason::NonPositiveDuration);
        }
        if d < self.config.min_duration_minutes {
            return Err(DropReason::BelowMinDuration);
        }
        if d > self.config.max_duration_minutes {
            return Err(DropReason::ExceedsMaxDuration);
        }
        if trip.is_round_trip() && d < self.config.round_trip_floor_minutes {
            return Err(DropReason::ShortRoundTrip);
        }

        Ok(())
    }

    fn check_window(&self, trip: &Trip) -> std::result::Result<(), DropReason> {
        if self.window.contains(trip.start_time) {
            Ok(())
        } else {
            Err(DropReason::OutsideWindow)
        }
    }
}
