//! Error taxonomy shared by every pipeline stage.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A single trip or weather row failed validation. Stages absorb these
    /// and report them only as drop counts.
    #[error("malformed record ({location}): {reason}")]
    MalformedRecord { location: String, reason: String },

    /// The weather provider could not supply (part of) a region's window.
    #[error("weather data unavailable for region '{region}' ({span}): {reason}")]
    DataUnavailable {
        region: String,
        span: String,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("required input not found: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        PipelineError::Configuration(msg.into())
    }

    pub fn malformed(location: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::MalformedRecord {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(
        region: impl Into<String>,
        span: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::DataUnavailable {
            region: region.into(),
            span: span.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_message_names_location() {
        let err = PipelineError::malformed("trips.csv:3", "bad time");
        assert_eq!(err.to_string(), "malformed record (trips.csv:3): bad time");
    }

    #[test]
    fn test_data_unavailable_message_names_region() {
        let err = PipelineError::unavailable("Westside", "2024-11-01..2024-11-30", "status 503");
        let msg = err.to_string();
        assert!(msg.contains("Westside"));
        assert!(msg.contains("2024-11-01..2024-11-30"));
    }
}
