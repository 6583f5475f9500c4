use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why the cleaner discarded a raw trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    Malformed,
    MissingField,
    VirtualStation,
    Duplicate,
    NonPositiveDuration,
    BelowMinDuration,
    ExceedsMaxDuration,
    ShortRoundTrip,
    OutsideWindow,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Malformed => "malformed",
            DropReason::MissingField => "missing_field",
            DropReason::VirtualStation => "virtual_station",
            DropReason::Duplicate => "duplicate",
            DropReason::NonPositiveDuration => "non_positive_duration",
            DropReason::BelowMinDuration => "below_min_duration",
            DropReason::ExceedsMaxDuration => "exceeds_max_duration",
            DropReason::ShortRoundTrip => "short_round_trip",
            DropReason::OutsideWindow => "outside_window",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct CleaningReport {
    pub timestamp: DateTime<Utc>,
    pub window_tag: Option<String>,
    pub files: usize,
    pub rows_seen: usize,
    pub rows_kept: usize,

    // drops by reason
    pub malformed: usize,
    pub missing_field: usize,
    pub virtual_station: usize,
    pub duplicate: usize,
    pub non_positive_duration: usize,
    pub below_min_duration: usize,
    pub exceeds_max_duration: usize,
    pub short_round_trip: usize,
    pub outside_window: usize,
}

impl CleaningReport {
    pub fn new(window_tag: &str) -> Self {
        CleaningReport {
            timestamp: Utc::now(),
            window_tag: Some(window_tag.to_string()),
            ..Default::default()
        }
    }

    pub fn record_drop(&mut self, reason: DropReason) {
        let slot = match reason {
            DropReason::Malformed => &mut self.malformed,
            DropReason::MissingField => &mut self.missing_field,
            DropReason::VirtualStation => &mut self.virtual_station,
            DropReason::Duplicate => &mut self.duplicate,
            DropReason::NonPositiveDuration => &mut self.non_positive_duration,
            DropReason::BelowMinDuration => &mut self.below_min_duration,
            DropReason::ExceedsMaxDuration => &mut self.exceeds_max_duration,
            DropReason::ShortRoundTrip => &mut self.short_round_trip,
            DropReason::OutsideWindow => &mut self.outside_window,
        };
        *slot += 1;
    }

    /// Adds another report's row and drop counts into this one.
    pub fn merge(&mut self, other: &CleaningReport) {
        self.files += other.files;
        self.rows_seen += other.rows_seen;
        self.rows_kept += other.rows_kept;
        self.malformed += other.malformed;
        self.missing_field += other.missing_field;
        self.virtual_station += other.virtual_station;
        self.duplicate += other.duplicate;
        self.non_positive_duration += other.non_positive_duration;
        self.below_min_duration += other.below_min_duration;
        self.exceeds_max_duration += other.exceeds_max_duration;
        self.short_round_trip += other.short_round_trip;
        self.outside_window += other.outside_window;
    }

    pub fn dropped(&self) -> usize {
        self.malformed
            + self.missing_field
            + self.virtual_station
            + self.duplicate
            + self.non_positive_duration
            + self.below_min_duration
            + self.exceeds_max_duration
            + self.short_round_trip
            + self.outside_window
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn kept_pct(&self) -> f64 {
        Self::pct(self.rows_kept, self.rows_seen)
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct AssemblyReport {
    pub timestamp: DateTime<Utc>,
    pub window_tag: Option<String>,
    pub regions: usize,
    pub days: usize,
    pub rows: usize,
    pub trips_counted: usize,
    pub trips_unassigned: usize,
    pub trips_outside_window: usize,
    pub zero_trip_rows: usize,
    pub missing_weather_rows: usize,
    pub incomplete_weather_regions: Vec<String>,
}

impl AssemblyReport {
    pub fn new(window_tag: &str) -> Self {
        AssemblyReport {
            timestamp: Utc::now(),
            window_tag: Some(window_tag.to_string()),
            ..Default::default()
        }
    }

    pub fn zero_trip_pct(&self) -> f64 {
        CleaningReport::pct(self.zero_trip_rows, self.rows)
    }
}

/// Arithmetic mean; `None` for empty input.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Round to three decimals, the precision of every float column in the panels.
pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
