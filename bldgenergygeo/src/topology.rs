use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::info;

use crate::collect::global_variables::TOPOJSON_COMMAND;
use crate::error::{PipelineError, Result};

/// Turns an exported GeoJSON file into a topology-preserving TopoJSON file
pub trait TopologyConverter {
    fn convert(&self, geojson: &Path, topojson: &Path) -> Result<()>;
}

/// Converter backed by an external command line tool.
///
/// Runs `command [args..] -o <topojson> <geojson>`. With the default `-p`
/// every feature property is carried into the topology. The TopoJSON object
/// is named after the GeoJSON file stem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConverter {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for ExternalConverter {
    fn default() -> Self {
        ExternalConverter {
            command: TOPOJSON_COMMAND.to_string(),
            args: vec!["-p".to_string()],
        }
    }
}

impl ExternalConverter {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        ExternalConverter {
            command: command.into(),
            args,
        }
    }
}

impl TopologyConverter for ExternalConverter {
    fn convert(&self, geojson: &Path, topojson: &Path) -> Result<()> {
        if !geojson.exists() {
            return Err(PipelineError::InputNotFound(geojson.to_path_buf()));
        }

        info!(
            command = %self.command,
            input = %geojson.display(),
            output = %topojson.display(),
            "Converting GeoJSON to TopoJSON"
        );

        let output = Command::new(&self.command)
            .args(&self.args)
            .arg("-o")
            .arg(topojson)
            .arg(geojson)
            .output()
            .map_err(|e| {
                PipelineError::ExternalConverterFailure(format!(
                    "Failed to execute {} ({}). Make sure it is installed and in PATH",
                    self.command, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::ExternalConverterFailure(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        if !topojson.exists() {
            return Err(PipelineError::ExternalConverterFailure(format!(
                "{} reported success but wrote no {}",
                self.command,
                topojson.display()
            )));
        }

        info!(output = %topojson.display(), "TopoJSON saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_command() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("bldgsenergygeo.json");
        fs::write(&input, r#"{"type":"FeatureCollection","features":[]}"#).unwrap();

        let converter = ExternalConverter::new("bldgenergygeo-no-such-topojson", vec![]);
        let err = converter
            .convert(&input, &dir.path().join("bldgsenergytopo.json"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ExternalConverterFailure(_)));
    }

    #[test]
    fn test_missing_geojson() {
        let dir = TempDir::new().unwrap();
        let err = ExternalConverter::default()
            .convert(&dir.path().join("absent.json"), &dir.path().join("out.json"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InputNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("bldgsenergygeo.json");
        fs::write(&input, "{}").unwrap();

        let converter = ExternalConverter::new("false", vec![]);
        let err = converter
            .convert(&input, &dir.path().join("bldgsenergytopo.json"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ExternalConverterFailure(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_line_shape() {
        // `sh -c 'cp "$3" "$2"' sh -o OUT IN` copies IN to OUT
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("bldgsenergygeo.json");
        let output = dir.path().join("bldgsenergytopo.json");
        fs::write(&input, "{}").unwrap();

        let converter = ExternalConverter::new(
            "sh",
            vec!["-c".to_string(), r#"cp "$3" "$2""#.to_string(), "sh".to_string()],
        );
        converter.convert(&input, &output).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "{}");
    }

    #[test]
    fn test_default_converter() {
        let converter = ExternalConverter::default();
        assert_eq!(converter.command, "topojson");
        assert_eq!(converter.args, vec!["-p".to_string()]);
    }
}
