use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the pipeline stages. Every variant is fatal to a run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Schema mismatch in {input}: missing {}", .missing.join(", "))]
    SchemaMismatch { input: String, missing: Vec<String> },

    #[error("Malformed record {record} in {input}: {reason}")]
    MalformedRecord {
        input: String,
        record: usize,
        reason: String,
    },

    #[error("Reprojection failed: {0}")]
    ReprojectionFailure(String),

    #[error("External converter failed: {0}")]
    ExternalConverterFailure(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    GeoJson(#[from] geojson::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[cfg(feature = "polars")]
    #[error(transparent)]
    Polars(#[from] polars::prelude::PolarsError),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub(crate) fn malformed(input: &str, record: usize, reason: impl Into<String>) -> Self {
        PipelineError::MalformedRecord {
            input: input.to_string(),
            record,
            reason: reason.into(),
        }
    }
}
