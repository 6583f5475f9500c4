//! Raw trip file ingestion.
//!
//! Rows are streamed to a visitor as they are deserialized, so a file is never
//! held in memory as raw records.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::trips::RawTrip;

fn is_trip_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".csv") || name.ends_with(".csv.gz")
}

/// Expands directories into their sorted trip files. A missing path is fatal.
pub fn expand_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if paths.is_empty() {
        return Err(PipelineError::config("paths.raw_trips is empty"));
    }

    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            return Err(PipelineError::MissingInput { path: path.clone() });
        }

        if path.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_trip_file(p))
                .collect();
            found.sort();

            if found.is_empty() {
                return Err(PipelineError::MissingInput { path: path.clone() });
            }
            debug!(dir = %path.display(), files = found.len(), "Expanded trip directory");
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }

    Ok(files)
}

/// Scans one raw trip file, transparently gunzipping `.gz` inputs.
pub fn scan_trip_file(path: &Path, visit: impl FnMut(RawTrip, bool)) -> Result<usize> {
    let file = File::open(path)?;
    let is_gz = path.extension().and_then(|e| e.to_str()) == Some("gz");

    if is_gz {
        scan_trip_reader(path, GzDecoder::new(BufReader::new(file)), visit)
    } else {
        scan_trip_reader(path, BufReader::new(file), visit)
    }
}

/// Hands every row that deserializes to `visit`, together with whether the
/// export has a `duration` column. Returns the number of rows that did not
/// deserialize.
pub fn scan_trip_reader<R: Read>(
    source: &Path,
    reader: R,
    mut visit: impl FnMut(RawTrip, bool),
) -> Result<usize> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(reader);

    let has_duration = rdr.headers()?.iter().any(|h| h == "duration");
    let mut rows = 0usize;
    let mut malformed = 0usize;

    for result in rdr.deserialize::<RawTrip>() {
        match result {
            Ok(row) => {
                rows += 1;
                visit(row, has_duration);
            }
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                let err = PipelineError::malformed(
                    format!("{}:{line}", source.display()),
                    e.to_string(),
                );
                debug!(error = %err, "Skipping row");
                malformed += 1;
            }
        }
    }

    if malformed > 0 {
        warn!(
            source = %source.display(),
            malformed,
            "Rows could not be deserialized"
        );
    }
    info!(source = %source.display(), rows, has_duration, "Read trip file");

    Ok(malformed)
}
