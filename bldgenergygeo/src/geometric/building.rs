use geo::MultiPolygon;
use geojson::{Feature as GeoJsonFeature, FeatureReader, Geometry};
#[cfg(feature = "polars")]
use polars::prelude::*;
use serde_json::Map;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

#[cfg(feature = "indicatif")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::collect::shapefile::{prepare_geojson, FootprintSource};
use crate::commons::basic_functions::{bbl_from_json, borough_from_bbl, f64_from_json};
use crate::error::{PipelineError, Result};
use crate::geo_core::Reprojector;

/// Attribute columns every footprint feature must carry
pub const FOOTPRINT_COLUMNS: [&str; 5] =
    ["BBL", "GROUND_ELE", "HEIGHT_ROO", "Shape_Area", "Shape_Leng"];

#[cfg(feature = "indicatif")]
fn progress_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{elapsed_precise}] {spinner} {pos} {msg}")
        .unwrap()
}

/// One footprint row of the building dataset
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingRecord {
    /// Borough-block-lot identifier
    pub bbl: String,
    /// Borough code, first digit of the BBL
    pub boro: u8,
    /// Ground elevation in feet (GROUND_ELE)
    pub ground_elevation: Option<f64>,
    /// Roof height in feet (HEIGHT_ROO)
    pub roof_height: Option<f64>,
    /// Shape_Area
    pub shape_area: Option<f64>,
    /// Shape_Leng, the footprint perimeter
    pub shape_length: Option<f64>,
    /// Footprint in the dataset's projected, feet-based reference
    pub geometry: MultiPolygon<f64>,
    /// Footprint in longitude/latitude, filled by [`BuildingTable::reproject`]
    pub geometry_latlon: Option<MultiPolygon<f64>>,
}

impl BuildingRecord {
    /// Create a record, deriving the borough from the BBL
    pub fn new(bbl: impl Into<String>, geometry: MultiPolygon<f64>) -> Option<Self> {
        let bbl = bbl.into();
        let boro = borough_from_bbl(&bbl)?;
        Some(BuildingRecord {
            bbl,
            boro,
            ground_elevation: None,
            roof_height: None,
            shape_area: None,
            shape_length: None,
            geometry,
            geometry_latlon: None,
        })
    }
}

/// Footprints sorted and indexed by BBL. A BBL may own several rows.
#[derive(Debug, Clone, Default)]
pub struct BuildingTable {
    records: Vec<BuildingRecord>,
    index: BTreeMap<String, Vec<usize>>,
    skipped: usize,
}

impl BuildingTable {
    pub fn new(mut records: Vec<BuildingRecord>) -> Self {
        records.sort_by(|a, b| a.bbl.cmp(&b.bbl));

        let mut index: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, record) in records.iter().enumerate() {
            index.entry(record.bbl.clone()).or_default().push(i);
        }

        BuildingTable {
            records,
            index,
            skipped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, bbl: &str) -> bool {
        self.index.contains_key(bbl)
    }

    /// All rows sharing a BBL
    pub fn get(&self, bbl: &str) -> Vec<&BuildingRecord> {
        self.index
            .get(bbl)
            .map(|rows| rows.iter().map(|&i| &self.records[i]).collect())
            .unwrap_or_default()
    }

    pub fn records(&self) -> &[BuildingRecord] {
        &self.records
    }

    /// Number of distinct BBLs
    pub fn unique_bbls(&self) -> usize {
        self.index.len()
    }

    /// Features dropped at load time because their geometry was not a polygon
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Rows grouped by BBL, in BBL order
    pub fn into_groups(self) -> BTreeMap<String, Vec<BuildingRecord>> {
        let mut groups: BTreeMap<String, Vec<BuildingRecord>> = BTreeMap::new();
        for record in self.records {
            groups.entry(record.bbl.clone()).or_default().push(record);
        }
        groups
    }

    /// Load footprints from a shapefile, a zipped shapefile or a GeoJSON file
    pub fn from_path(path: &Path) -> Result<Self> {
        let source = FootprintSource::from_path(path)?;

        #[cfg(feature = "gdal")]
        {
            match &source {
                FootprintSource::Shapefile(shp) => return Self::from_shapefile_gdal(shp),
                FootprintSource::Zip(zip) => {
                    let scratch = crate::collect::shapefile::extract_zip(zip)?;
                    let shp = crate::collect::shapefile::find_shapefile(scratch.path())?;
                    return Self::from_shapefile_gdal(&shp);
                }
                FootprintSource::GeoJson(_) => {}
            }
        }

        let prepared = prepare_geojson(&source)?;
        let file = File::open(&prepared.path)?;
        Self::from_geojson_reader(BufReader::new(file), &path.display().to_string())
    }

    /// Load footprints from in-memory GeoJSON
    pub fn from_geojson_bytes(geojson_data: &[u8]) -> Result<Self> {
        Self::from_geojson_reader(geojson_data, "<memory>")
    }

    /// Stream a GeoJSON FeatureCollection feature by feature
    pub fn from_geojson_reader<R: Read>(reader: R, input: &str) -> Result<Self> {
        let mut records = Vec::new();
        let mut skipped = 0usize;

        #[cfg(feature = "indicatif")]
        let pb = {
            let pb = ProgressBar::new_spinner();
            pb.set_style(progress_style());
            pb.set_message("footprints");
            pb
        };

        for (idx, feature) in FeatureReader::from_reader(reader).features().enumerate() {
            let feature = feature?;

            check_schema(&feature, idx, input)?;

            match Self::geojson_feature_to_record(&feature, idx, input)? {
                Some(record) => records.push(record),
                None => {
                    skipped += 1;
                    warn!(feature = idx, "Skipping footprint without polygon geometry");
                }
            }

            #[cfg(feature = "indicatif")]
            pb.inc(1);
        }

        #[cfg(feature = "indicatif")]
        pb.finish_with_message("footprints loaded");

        let mut table = Self::new(records);
        table.skipped = skipped;

        info!(
            input,
            rows = table.len(),
            unique_bbls = table.unique_bbls(),
            skipped,
            "Loaded building footprints"
        );
        Ok(table)
    }

    /// Convert a GeoJSON feature to a record.
    /// Returns None when the geometry is missing or not polygonal.
    fn geojson_feature_to_record(
        feature: &GeoJsonFeature,
        idx: usize,
        input: &str,
    ) -> Result<Option<BuildingRecord>> {
        let Some(geometry) = feature.geometry.as_ref() else {
            return Ok(None);
        };
        let Some(footprint) = Self::geojson_geometry_to_multipolygon(geometry)? else {
            return Ok(None);
        };

        let empty = Map::new();
        let properties = feature.properties.as_ref().unwrap_or(&empty);

        let bbl = properties
            .get("BBL")
            .and_then(bbl_from_json)
            .ok_or_else(|| PipelineError::malformed(input, idx, "feature has no BBL"))?;

        let mut record = BuildingRecord::new(bbl.clone(), footprint).ok_or_else(|| {
            PipelineError::malformed(input, idx, format!("BBL {:?} has no borough digit", bbl))
        })?;

        let number = |key: &str| properties.get(key).and_then(f64_from_json);
        record.ground_elevation = number("GROUND_ELE");
        record.roof_height = number("HEIGHT_ROO");
        record.shape_area = number("Shape_Area");
        record.shape_length = number("Shape_Leng");

        Ok(Some(record))
    }

    /// Polygon and MultiPolygon both become MultiPolygon; anything else is None
    fn geojson_geometry_to_multipolygon(geometry: &Geometry) -> Result<Option<MultiPolygon<f64>>> {
        let geo_geom: geo::Geometry<f64> = geometry.try_into()?;

        match geo_geom {
            geo::Geometry::Polygon(poly) => Ok(Some(MultiPolygon::new(vec![poly]))),
            geo::Geometry::MultiPolygon(mp) if !mp.0.is_empty() => Ok(Some(mp)),
            _ => Ok(None),
        }
    }

    /// Read a shapefile in-process through GDAL
    #[cfg(feature = "gdal")]
    pub fn from_shapefile_gdal(path: &Path) -> Result<Self> {
        use gdal::vector::LayerAccess;
        use gdal::Dataset;

        if !path.exists() {
            return Err(PipelineError::InputNotFound(path.to_path_buf()));
        }

        let input = path.display().to_string();
        let unreadable =
            |e: gdal::errors::GdalError| PipelineError::malformed(&input, 0, e.to_string());

        let dataset = Dataset::open(path).map_err(unreadable)?;
        let mut layer = dataset.layer(0).map_err(unreadable)?;

        let defn_names: Vec<String> = layer.defn().fields().map(|f| f.name()).collect();
        let missing: Vec<String> = FOOTPRINT_COLUMNS
            .iter()
            .filter(|c| !defn_names.iter().any(|n| n == *c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch {
                input: input.clone(),
                missing,
            });
        }

        let mut records = Vec::new();
        let mut skipped = 0usize;

        for (idx, feature) in layer.features().enumerate() {
            let bad_field =
                |e: gdal::errors::GdalError| PipelineError::malformed(&input, idx, e.to_string());
            let field = |name: &str| -> Result<Option<f64>> {
                let i = feature.field_index(name).map_err(bad_field)?;
                feature.field_as_double(i).map_err(bad_field)
            };

            let bbl_idx = feature.field_index("BBL").map_err(bad_field)?;
            let bbl = feature
                .field_as_string(bbl_idx)
                .map_err(bad_field)?
                .and_then(|s| crate::commons::basic_functions::normalize_bbl(&s))
                .ok_or_else(|| PipelineError::malformed(&input, idx, "feature has no BBL"))?;

            let Some(geom_ref) = feature.geometry() else {
                skipped += 1;
                continue;
            };
            let wkt = geom_ref.wkt().map_err(bad_field)?;
            let geos_geom = geos::Geometry::new_from_wkt(&wkt)
                .map_err(|e| PipelineError::malformed(&input, idx, e.to_string()))?;
            let geo_geom: geo::Geometry<f64> = geos_geom
                .try_into()
                .map_err(|e: geos::Error| PipelineError::malformed(&input, idx, e.to_string()))?;

            let footprint = match geo_geom {
                geo::Geometry::Polygon(poly) => MultiPolygon::new(vec![poly]),
                geo::Geometry::MultiPolygon(mp) if !mp.0.is_empty() => mp,
                _ => {
                    skipped += 1;
                    continue;
                }
            };

            let mut record = BuildingRecord::new(bbl.clone(), footprint).ok_or_else(|| {
                PipelineError::malformed(&input, idx, format!("BBL {:?} has no borough digit", bbl))
            })?;
            record.ground_elevation = field("GROUND_ELE")?;
            record.roof_height = field("HEIGHT_ROO")?;
            record.shape_area = field("Shape_Area")?;
            record.shape_length = field("Shape_Leng")?;
            records.push(record);
        }

        let mut table = Self::new(records);
        table.skipped = skipped;
        info!(input = %input, rows = table.len(), skipped, "Loaded building footprints with GDAL");
        Ok(table)
    }

    /// Fill `geometry_latlon` for every row
    pub fn reproject(&mut self, reprojector: &dyn Reprojector) -> Result<()> {
        for record in &mut self.records {
            let latlon = reprojector
                .reproject_multipolygon(&record.geometry)
                .map_err(|e| match e {
                    PipelineError::ReprojectionFailure(msg) => {
                        PipelineError::ReprojectionFailure(format!("BBL {}: {}", record.bbl, msg))
                    }
                    other => other,
                })?;
            record.geometry_latlon = Some(latlon);
        }
        debug!(rows = self.records.len(), "Reprojected footprints");
        Ok(())
    }

    /// Attribute columns as a Polars DataFrame
    #[cfg(feature = "polars")]
    pub fn to_polars_df(&self) -> Result<DataFrame> {
        let bbl: Vec<&str> = self.records.iter().map(|r| r.bbl.as_str()).collect();
        let boro: Vec<u32> = self.records.iter().map(|r| r.boro as u32).collect();
        let ground: Vec<Option<f64>> = self.records.iter().map(|r| r.ground_elevation).collect();
        let height: Vec<Option<f64>> = self.records.iter().map(|r| r.roof_height).collect();
        let area: Vec<Option<f64>> = self.records.iter().map(|r| r.shape_area).collect();
        let length: Vec<Option<f64>> = self.records.iter().map(|r| r.shape_length).collect();

        let df = df! [
            "BBL" => bbl,
            "boro" => boro,
            "GROUND_ELE" => ground,
            "HEIGHT_ROO" => height,
            "Shape_Area" => area,
            "Shape_Leng" => length,
        ]?;

        Ok(df)
    }
}

/// Every feature must carry all attribute columns, `null` values included
fn check_schema(feature: &GeoJsonFeature, idx: usize, input: &str) -> Result<()> {
    let missing: Vec<String> = FOOTPRINT_COLUMNS
        .iter()
        .filter(|column| {
            !feature
                .properties
                .as_ref()
                .is_some_and(|p| p.contains_key(**column))
        })
        .map(|column| column.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::SchemaMismatch {
            input: format!("{} (feature {})", input, idx),
            missing,
        })
    }
}
