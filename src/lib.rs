pub mod config;
pub mod error;
pub mod fetch;
pub mod output;
pub mod panel;
pub mod regions;
pub mod stats;
pub mod trips;
pub mod weather;

pub use error::{PipelineError, Result};
