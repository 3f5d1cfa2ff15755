//! Joins New York City building footprints with Local Law 84 energy and
//! water disclosures and exports a filtered, web-ready GeoJSON layer.

pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod geo_core;
pub mod geometric;
pub mod pipeline;
pub mod topology;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{run, run_with_config, RunReport};
