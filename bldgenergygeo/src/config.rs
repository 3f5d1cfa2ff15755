use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::collect::global_variables::{
    cleaned_path, DEFAULT_BOROUGH, DEFAULT_LAT_MAX, DEFAULT_LAT_MIN, ENERGY_PATH, FOOTPRINTS_PATH,
    GEOJSON_OUTPUT_PATH, TOPOJSON_OUTPUT_PATH,
};
use crate::error::{PipelineError, Result};
use crate::geo_core::{GeoCore, LatitudeBand};
use crate::geometric::export::{ExportColumn, ExportFilter};
use crate::topology::ExternalConverter;

/// Settings of one pipeline run, read from TOML.
/// Every section and field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub inputs: InputsConfig,
    pub projection: GeoCore,
    pub filter: FilterConfig,
    pub output: OutputConfig,
    pub export: ExportConfig,
    pub topology: TopologyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    pub footprints: PathBuf,
    pub energy: PathBuf,
    /// Where the sanitized CSV is written, `cleaned_<name>` beside the input if unset
    pub cleaned_energy: Option<PathBuf>,
}

impl Default for InputsConfig {
    fn default() -> Self {
        InputsConfig {
            footprints: PathBuf::from(FOOTPRINTS_PATH),
            energy: PathBuf::from(ENERGY_PATH),
            cleaned_energy: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub borough: u8,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            borough: DEFAULT_BOROUGH,
            lat_min: DEFAULT_LAT_MIN,
            lat_max: DEFAULT_LAT_MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub geojson: PathBuf,
    pub topojson: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            geojson: PathBuf::from(GEOJSON_OUTPUT_PATH),
            topojson: PathBuf::from(TOPOJSON_OUTPUT_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub columns: Vec<ExportColumn>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            columns: ExportColumn::defaults(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub converter: ExternalConverter,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        TopologyConfig {
            enabled: false,
            converter: ExternalConverter::default(),
        }
    }
}

impl PipelineConfig {
    /// Read and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let filter = &self.filter;
        if !(filter.lat_min.is_finite() && filter.lat_max.is_finite()) {
            return Err(PipelineError::Config(
                "Latitude band bounds must be finite".to_string(),
            ));
        }
        if filter.lat_min >= filter.lat_max {
            return Err(PipelineError::Config(format!(
                "Inverted latitude band: lat_min {} is not below lat_max {}",
                filter.lat_min, filter.lat_max
            )));
        }
        if !(1..=5).contains(&filter.borough) {
            return Err(PipelineError::Config(format!(
                "Borough code {} outside 1..=5",
                filter.borough
            )));
        }
        if self.export.columns.is_empty() {
            return Err(PipelineError::Config(
                "Export column list is empty".to_string(),
            ));
        }
        if self.topology.enabled && self.topology.converter.command.trim().is_empty() {
            return Err(PipelineError::Config(
                "Topology conversion enabled without a command".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cleaned_energy_path(&self) -> PathBuf {
        self.inputs
            .cleaned_energy
            .clone()
            .unwrap_or_else(|| cleaned_path(&self.inputs.energy))
    }

    pub fn geo_core(&self) -> GeoCore {
        self.projection
    }

    pub fn export_filter(&self) -> ExportFilter {
        ExportFilter::new(
            self.filter.borough,
            LatitudeBand::new(self.filter.lat_min, self.filter.lat_max),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.projection, GeoCore::new(2263, 4326));
        assert_eq!(config.filter.borough, 1);
        assert_eq!(config.export.columns.len(), 9);
        assert!(!config.topology.enabled);
        assert_eq!(config.topology.converter.command, "topojson");
        assert_eq!(
            config.cleaned_energy_path(),
            PathBuf::from("cleaned_Energy_and_Water_Data_Disclosure_for_Local_Law_84__2012_.csv")
        );
    }

    #[test]
    fn test_partial_sections() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [inputs]
            footprints = "data/footprints.geojson"

            [projection]
            source_epsg = 3857
            target_epsg = 4326

            [filter]
            lat_min = 40.70
            lat_max = 40.80

            [export]
            columns = ["boro", "Address"]

            [topology]
            enabled = true
            args = ["-p", "-q", "1e5"]
            "#,
        )
        .unwrap();

        assert_eq!(config.inputs.footprints, PathBuf::from("data/footprints.geojson"));
        assert_eq!(config.inputs.energy, PathBuf::from(ENERGY_PATH));
        assert_eq!(config.projection.source_epsg, 3857);
        assert_eq!(config.filter.borough, 1);
        assert_eq!(config.export.columns, vec![ExportColumn::Boro, ExportColumn::Address]);
        assert!(config.topology.enabled);
        assert_eq!(config.topology.converter.command, "topojson");
        assert_eq!(config.topology.converter.args.len(), 3);

        let filter = config.export_filter();
        assert_eq!(filter.latitude, LatitudeBand::new(40.70, 40.80));
    }

    #[test]
    fn test_validate_rejects() {
        let inverted = "[filter]\nlat_min = 40.9\nlat_max = 40.5\n";
        assert!(matches!(
            PipelineConfig::from_toml_str(inverted),
            Err(PipelineError::Config(_))
        ));

        let borough = "[filter]\nborough = 6\n";
        assert!(matches!(
            PipelineConfig::from_toml_str(borough),
            Err(PipelineError::Config(_))
        ));

        let columns = "[export]\ncolumns = []\n";
        assert!(matches!(
            PipelineConfig::from_toml_str(columns),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_column_is_toml_error() {
        let err = PipelineConfig::from_toml_str("[export]\ncolumns = [\"Floors\"]\n").unwrap_err();
        assert!(matches!(err, PipelineError::Toml(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bldgenergygeo.toml");
        fs::write(&path, "[output]\ngeojson = \"out/geo.json\"\n").unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.output.geojson, PathBuf::from("out/geo.json"));
        assert_eq!(config.output.topojson, PathBuf::from(TOPOJSON_OUTPUT_PATH));

        let missing = PipelineConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(PipelineError::Config(_))));
    }
}
