//! Trip-to-region assignment and great-circle distance.
//!
//! Regions come from one of two sources:
//! - a station metadata table mapping each station id to a region name, or
//! - bounding boxes on the configured regions, checked in configuration order
//!   against the trip's start coordinate (first match wins).

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{BoundingBox, StudyConfig};
use crate::error::{PipelineError, Result};
use crate::trips::{Trip, normalize_station_id};

pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Haversine distance in miles between two coordinates given in degrees.
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let hav = |x: f64| (1.0 - x.cos()) / 2.0;

    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (lon2 - lon1).to_radians();

    let h = hav(d_lat) + lat1.cos() * lat2.cos() * hav(d_lon);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().asin()
}

#[derive(Debug, Deserialize)]
struct StationRow {
    #[serde(alias = "Kiosk ID", alias = "kiosk_id")]
    station_id: String,
    #[serde(alias = "Region", default)]
    region: Option<String>,
}

#[derive(Debug, Clone)]
pub enum RegionResolver {
    StationTable(HashMap<String, String>),
    Boxes(Vec<(String, BoundingBox)>),
}

impl RegionResolver {
    /// Station table when configured, otherwise region bounding boxes.
    pub fn from_config(config: &StudyConfig) -> Result<Self> {
        if let Some(stations) = &config.stations {
            if !stations.path.exists() {
                return Err(PipelineError::MissingInput {
                    path: stations.path.clone(),
                });
            }
            let file = File::open(&stations.path)?;
            let resolver = Self::from_station_reader(file)?;
            info!(path = %stations.path.display(), "Loaded station table");
            return Ok(resolver);
        }

        let boxes: Vec<_> = config
            .regions
            .iter()
            .filter_map(|r| r.bounds.map(|b| (r.name.clone(), b)))
            .collect();

        if boxes.is_empty() {
            return Err(PipelineError::config(
                "no station table and no region bounds to assign trips with",
            ));
        }
        Ok(RegionResolver::Boxes(boxes))
    }

    pub fn from_station_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut table = HashMap::new();

        for result in rdr.deserialize() {
            let row: StationRow = result?;
            let Some(region) = row.region.filter(|r| !r.is_empty()) else {
                debug!(station = %row.station_id, "Station has no region");
                continue;
            };
            table.insert(normalize_station_id(&row.station_id), region);
        }

        info!(stations = table.len(), "Station table ready");
        Ok(RegionResolver::StationTable(table))
    }

    /// Region name for a trip, or `None` when it cannot be placed.
    pub fn resolve<'a>(&'a self, trip: &Trip) -> Option<&'a str> {
        match self {
            RegionResolver::StationTable(table) => {
                table.get(&trip.start_station).map(String::as_str)
            }
            RegionResolver::Boxes(boxes) => {
                let (lat, lon) = (trip.start_lat?, trip.start_lon?);
                boxes
                    .iter()
                    .find(|(_, b)| b.contains(lat, lon))
                    .map(|(name, _)| name.as_str())
            }
        }
    }
}
