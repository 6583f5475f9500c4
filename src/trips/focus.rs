//! Trips touching a set of focus stations (e.g. a campus), and the most
//! frequent station pairs.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::trips::Trip;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusDirection {
    FromFocus,
    ToFocus,
    WithinFocus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocusTrip {
    pub direction: FocusDirection,
    pub trip_id: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub start_station: String,
    pub end_station: String,
    pub duration_min: f64,
    pub distance_mi: Option<f64>,
    pub bike_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationPairCount {
    pub start_station: String,
    pub end_station: String,
    pub count: usize,
}

pub fn extract_focus(trips: &[Trip], focus_stations: &[String]) -> Vec<FocusTrip> {
    let focus: HashSet<&str> = focus_stations.iter().map(String::as_str).collect();
    if focus.is_empty() {
        return Vec::new();
    }

    trips
        .iter()
        .filter_map(|t| {
            let from = focus.contains(t.start_station.as_str());
            let to = focus.contains(t.end_station.as_str());
            let direction = match (from, to) {
                (true, true) => FocusDirection::WithinFocus,
                (true, false) => FocusDirection::FromFocus,
                (false, true) => FocusDirection::ToFocus,
                (false, false) => return None,
            };

            Some(FocusTrip {
                direction,
                trip_id: t.trip_id.clone(),
                start_time: t.start_time,
                end_time: t.end_time,
                start_station: t.start_station.clone(),
                end_station: t.end_station.clone(),
                duration_min: t.duration_min,
                distance_mi: t.distance_mi,
                bike_id: t.bike_id.clone(),
            })
        })
        .collect()
}

/// The `n` most frequent (start, end) station pairs; ties are ordered by ids.
pub fn top_station_pairs<'a, I>(trips: I, n: usize) -> Vec<StationPairCount>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
    for pair in trips {
        *counts.entry(pair).or_default() += 1;
    }

    let mut pairs: Vec<_> = counts.into_iter().collect();
    pairs.sort_by(|(a, ca), (b, cb)| cb.cmp(ca).then_with(|| a.cmp(b)));

    pairs
        .into_iter()
        .take(n)
        .map(|((start, end), count)| StationPairCount {
            start_station: start.to_string(),
            end_station: end.to_string(),
            count,
        })
        .collect()
}
