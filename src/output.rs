//! Table persistence and run summaries.
//!
//! Every table the pipeline produces is a headed CSV written in one pass.

use std::fmt::Debug;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use csv::WriterBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Logs a summary using Rust's debug pretty-print format.
pub fn print_pretty<T: Debug>(summary: &T) {
    debug!("{:#?}", summary);
}

/// Logs a summary as pretty-printed JSON.
pub fn print_json<T: Serialize>(summary: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

/// Writes `rows` to `path` with a header line, replacing any existing file.
/// Parent directories are created as needed. Returns the number of rows.
pub fn write_records<T, I>(path: &Path, rows: I) -> Result<usize>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_writer(BufWriter::new(file));

    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = count, "Wrote table");
    Ok(count)
}

/// Reads a headed CSV table. Rows that fail to deserialize are skipped and
/// counted; a missing file is [`PipelineError::MissingInput`].
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, usize)> {
    if !path.exists() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    let mut skipped = 0;

    for result in reader.deserialize::<T>() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unreadable row");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "Some rows could not be read");
    }

    Ok((rows, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::CleaningReport;
    use serde::Deserialize;
    use std::env;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        region: String,
        hour: u32,
        value: Option<f64>,
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&CleaningReport::default());
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&CleaningReport::new("train")).unwrap();
    }

    #[test]
    fn test_write_records_creates_parent_dirs() {
        let dir = temp_path("ridership_panel_output_nested");
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("a/b/rows.csv");

        let n = write_records(&path, vec![Row { region: "DTLA".into(), hour: 0, value: Some(1.5) }]).unwrap();

        assert_eq!(n, 1);
        assert!(path.exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_records_replaces_file_with_single_header() {
        let path = temp_path("ridership_panel_output_replace.csv");
        let _ = fs::remove_file(&path);

        let rows = || vec![Row { region: "DTLA".into(), hour: 0, value: None }, Row { region: "DTLA".into(), hour: 1, value: Some(2.0) }];
        write_records(&path, rows()).unwrap();
        write_records(&path, rows()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "region,hour,value");
        assert_eq!(lines[1], "DTLA,0,");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_records_skips_bad_rows() {
        let path = temp_path("ridership_panel_output_read.csv");
        fs::write(&path, "region,hour,value\nDTLA,0,1.5\nDTLA,notanhour,2\nDTLA,2,\n").unwrap();

        let (rows, skipped): (Vec<Row>, _) = read_records(&path).unwrap();

        assert_eq!(skipped, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], Row { region: "DTLA".into(), hour: 2, value: None });

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_records_missing_file() {
        let err = read_records::<Row>(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput { .. }));
    }
}
