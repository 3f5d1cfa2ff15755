use geo::MultiPolygon;
use geojson::{feature::Id, Feature, FeatureCollection, GeoJson, Geometry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::geo_core::LatitudeBand;
use crate::geometric::energy::{self, Metric};
use crate::geometric::merge::{MergedRecord, MergedTable};

/// A property written to each exported feature, named by its source label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportColumn {
    #[serde(rename = "boro")]
    Boro,
    #[serde(rename = "GROUND_ELE")]
    GroundElevation,
    #[serde(rename = "HEIGHT_ROO")]
    RoofHeight,
    #[serde(rename = "Shape_Area")]
    ShapeArea,
    #[serde(rename = "Shape_Leng")]
    ShapeLength,
    #[serde(rename = "Street Number")]
    StreetNumber,
    #[serde(rename = "Street Name")]
    StreetName,
    #[serde(rename = "Primary Property Type - Self Selected")]
    PrimaryPropertyType,
    #[serde(rename = "Property Floor Area (Buildngs and Parking)(ft2)")]
    FloorArea,
    #[serde(rename = "Site EUI(kBtu/ft2)")]
    SiteEui,
    #[serde(rename = "Weather Normalized Source EUI(kBtu/ft2)")]
    SourceEui,
    #[serde(rename = "ENERGY STAR Score")]
    EnergyStarScore,
    #[serde(rename = "Total GHG Emissions(MtCO2e)")]
    TotalGhg,
    #[serde(rename = "Number of Buildings")]
    NumberOfBuildings,
    #[serde(rename = "Address")]
    Address,
}

impl ExportColumn {
    /// The columns the map front end reads
    pub fn defaults() -> Vec<ExportColumn> {
        vec![
            ExportColumn::Boro,
            ExportColumn::RoofHeight,
            ExportColumn::PrimaryPropertyType,
            ExportColumn::FloorArea,
            ExportColumn::SiteEui,
            ExportColumn::SourceEui,
            ExportColumn::EnergyStarScore,
            ExportColumn::TotalGhg,
            ExportColumn::Address,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExportColumn::Boro => "boro",
            ExportColumn::GroundElevation => "GROUND_ELE",
            ExportColumn::RoofHeight => "HEIGHT_ROO",
            ExportColumn::ShapeArea => "Shape_Area",
            ExportColumn::ShapeLength => "Shape_Leng",
            ExportColumn::StreetNumber => energy::STREET_NUMBER,
            ExportColumn::StreetName => energy::STREET_NAME,
            ExportColumn::PrimaryPropertyType => energy::PRIMARY_PROPERTY_TYPE,
            ExportColumn::FloorArea => energy::FLOOR_AREA,
            ExportColumn::SiteEui => energy::SITE_EUI,
            ExportColumn::SourceEui => energy::SOURCE_EUI,
            ExportColumn::EnergyStarScore => energy::ENERGY_STAR_SCORE,
            ExportColumn::TotalGhg => energy::TOTAL_GHG,
            ExportColumn::NumberOfBuildings => energy::NUMBER_OF_BUILDINGS,
            ExportColumn::Address => "Address",
        }
    }

    /// Property value for a merged row, `null` when absent
    pub fn value(&self, record: &MergedRecord) -> Value {
        let building = record.building.as_ref();
        let energy = record.energy.as_ref();

        let number = |v: Option<f64>| {
            v.and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        };
        let text = |v: Option<&String>| v.map(|s| Value::String(s.clone())).unwrap_or(Value::Null);
        let metric = |v: Option<&Metric>| v.map(Metric::to_json).unwrap_or(Value::Null);

        match self {
            ExportColumn::Boro => record.boro().map(Value::from).unwrap_or(Value::Null),
            ExportColumn::GroundElevation => number(building.and_then(|b| b.ground_elevation)),
            ExportColumn::RoofHeight => number(building.and_then(|b| b.roof_height)),
            ExportColumn::ShapeArea => number(building.and_then(|b| b.shape_area)),
            ExportColumn::ShapeLength => number(building.and_then(|b| b.shape_length)),
            ExportColumn::StreetNumber => text(energy.and_then(|e| e.street_number.as_ref())),
            ExportColumn::StreetName => text(energy.and_then(|e| e.street_name.as_ref())),
            ExportColumn::PrimaryPropertyType => {
                text(energy.and_then(|e| e.primary_property_type.as_ref()))
            }
            ExportColumn::FloorArea => metric(energy.and_then(|e| e.floor_area.as_ref())),
            ExportColumn::SiteEui => metric(energy.and_then(|e| e.site_eui.as_ref())),
            ExportColumn::SourceEui => metric(energy.and_then(|e| e.source_eui.as_ref())),
            ExportColumn::EnergyStarScore => {
                metric(energy.and_then(|e| e.energy_star_score.as_ref()))
            }
            ExportColumn::TotalGhg => metric(energy.and_then(|e| e.total_ghg.as_ref())),
            ExportColumn::NumberOfBuildings => {
                metric(energy.and_then(|e| e.number_of_buildings.as_ref()))
            }
            ExportColumn::Address => text(record.address.as_ref()),
        }
    }
}

/// Conjunctive export filter: both sources, one borough, one latitude band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportFilter {
    pub borough: u8,
    pub latitude: LatitudeBand,
}

impl ExportFilter {
    pub fn new(borough: u8, latitude: LatitudeBand) -> Self {
        ExportFilter { borough, latitude }
    }

    pub fn matches(&self, record: &MergedRecord) -> bool {
        record.has_both()
            && record.boro() == Some(self.borough)
            && record
                .latlon_bounds()
                .is_some_and(|bbox| self.latitude.intersects(&bbox))
    }
}

/// Rows left after each filter step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterCounts {
    pub with_both: usize,
    pub in_borough: usize,
    pub in_band: usize,
}

/// A feature ready for serialization, longitude/latitude footprint as geometry
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub properties: Map<String, Value>,
}

impl ExportRecord {
    /// None when the row has no longitude/latitude footprint
    pub fn from_merged(record: &MergedRecord, columns: &[ExportColumn]) -> Option<Self> {
        let geometry = record.building.as_ref()?.geometry_latlon.clone()?;

        let properties = columns
            .iter()
            .map(|c| (c.label().to_string(), c.value(record)))
            .collect();

        Some(ExportRecord {
            id: record.bbl.clone(),
            geometry,
            properties,
        })
    }

    pub fn to_feature(&self) -> Feature {
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(geojson::Value::from(&self.geometry))),
            id: Some(Id::String(self.id.clone())),
            properties: Some(self.properties.clone()),
            foreign_members: None,
        }
    }
}

/// Merged rows that pass the filter, in table order
pub fn filter_rows<'a>(
    table: &'a MergedTable,
    filter: &ExportFilter,
) -> (Vec<&'a MergedRecord>, FilterCounts) {
    let both: Vec<&MergedRecord> = table.records().iter().filter(|r| r.has_both()).collect();
    let borough: Vec<&MergedRecord> = both
        .iter()
        .copied()
        .filter(|r| r.boro() == Some(filter.borough))
        .collect();
    let band: Vec<&MergedRecord> = borough
        .iter()
        .copied()
        .filter(|r| filter.matches(r))
        .collect();

    let counts = FilterCounts {
        with_both: both.len(),
        in_borough: borough.len(),
        in_band: band.len(),
    };
    (band, counts)
}

/// Filter and project the merged table into export records
pub fn select(
    table: &MergedTable,
    filter: &ExportFilter,
    columns: &[ExportColumn],
) -> (Vec<ExportRecord>, FilterCounts) {
    let (rows, counts) = filter_rows(table, filter);
    let records: Vec<ExportRecord> = rows
        .into_iter()
        .filter_map(|r| ExportRecord::from_merged(r, columns))
        .collect();

    info!(
        with_both = counts.with_both,
        in_borough = counts.in_borough,
        in_band = counts.in_band,
        borough = filter.borough,
        lat_min = filter.latitude.min,
        lat_max = filter.latitude.max,
        "Selected rows for export"
    );

    (records, counts)
}

pub fn to_feature_collection(records: &[ExportRecord]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: records.iter().map(ExportRecord::to_feature).collect(),
        foreign_members: None,
    }
}

/// Write the records as a GeoJSON FeatureCollection
pub fn write_geojson(path: &Path, records: &[ExportRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let geojson = GeoJson::from(to_feature_collection(records));
    fs::write(path, geojson.to_string())?;

    info!(output = %path.display(), features = records.len(), "GeoJSON saved");
    Ok(())
}
