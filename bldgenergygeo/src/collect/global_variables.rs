use std::path::{Path, PathBuf};

/// Building footprint shapefile as unpacked from the NYC Open Data zip
pub const FOOTPRINTS_PATH: &str = "building_footprints_shape_webmercator_12-14/building_1214.shp";
/// Local Law 84 energy and water disclosure, 2012 reporting year
pub const ENERGY_PATH: &str = "Energy_and_Water_Data_Disclosure_for_Local_Law_84__2012_.csv";
pub const GEOJSON_OUTPUT_PATH: &str = "bldgsenergygeo.json";
pub const TOPOJSON_OUTPUT_PATH: &str = "bldgsenergytopo.json";

/// Prefix added to the energy file name for its sanitized copy
pub const CLEANED_PREFIX: &str = "cleaned_";

/// Manhattan
pub const DEFAULT_BOROUGH: u8 = 1;
/// Midtown band in the output range of the footprint reprojection
pub const DEFAULT_LAT_MIN: f64 = 48.117;
pub const DEFAULT_LAT_MAX: f64 = 48.129;

pub const TOPOJSON_COMMAND: &str = "topojson";

/// `cleaned_<name>` next to the input file
pub fn cleaned_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "energy.csv".to_string());
    input.with_file_name(format!("{}{}", CLEANED_PREFIX, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleaned_path_keeps_directory() {
        let path = cleaned_path(Path::new("data/ll84.csv"));
        assert_eq!(path, PathBuf::from("data/cleaned_ll84.csv"));
    }

    #[test]
    fn test_default_band_is_ordered() {
        assert!(DEFAULT_LAT_MIN < DEFAULT_LAT_MAX);
    }
}
