use geo::{BoundingRect, Coord, MapCoords, MultiPolygon, Rect};
#[cfg(feature = "proj")]
use proj::Proj;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// EPSG:2263, NAD83 / New York Long Island (ftUS), the footprint dataset's declared CRS
pub const EPSG_NY_LONG_ISLAND_FT: i32 = 2263;
/// EPSG:4326, WGS84 longitude/latitude expected by browser mapping libraries
pub const EPSG_WGS84: i32 = 4326;

/// Source and target coordinate references for the footprint geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoCore {
    pub source_epsg: i32,
    pub target_epsg: i32,
}

impl Default for GeoCore {
    fn default() -> Self {
        GeoCore::new(EPSG_NY_LONG_ISLAND_FT, EPSG_WGS84)
    }
}

impl GeoCore {
    pub fn new(source_epsg: i32, target_epsg: i32) -> Self {
        GeoCore {
            source_epsg,
            target_epsg,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.source_epsg == self.target_epsg
    }

    /// Build the reprojector for this pair of references.
    ///
    /// The transform is taken at face value: footprints whose declared CRS
    /// does not match their coordinates come out translated and rotated, and
    /// downstream filters are tuned against that output range.
    pub fn reprojector(&self) -> Result<Box<dyn Reprojector>> {
        if self.is_identity() {
            return Ok(Box::new(IdentityReprojector));
        }

        #[cfg(feature = "proj")]
        return Ok(Box::new(ProjReprojector::new(
            self.source_epsg,
            self.target_epsg,
        )?));

        #[cfg(not(feature = "proj"))]
        Err(PipelineError::ReprojectionFailure(format!(
            "EPSG:{} -> EPSG:{} needs the `proj` feature",
            self.source_epsg, self.target_epsg
        )))
    }
}

/// Coordinate transform applied to every footprint vertex
pub trait Reprojector {
    fn reproject_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>>;

    fn reproject_multipolygon(&self, geometry: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        geometry.try_map_coords(|coord| self.reproject_coord(coord))
    }
}

/// Pass-through used when the input is already in the target reference
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityReprojector;

impl Reprojector for IdentityReprojector {
    fn reproject_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        Ok(coord)
    }
}

/// PROJ-backed transform between two EPSG codes
#[cfg(feature = "proj")]
pub struct ProjReprojector {
    proj: Proj,
    from_epsg: i32,
    to_epsg: i32,
}

#[cfg(feature = "proj")]
impl ProjReprojector {
    pub fn new(from_epsg: i32, to_epsg: i32) -> Result<Self> {
        let from_crs = format!("EPSG:{}", from_epsg);
        let to_crs = format!("EPSG:{}", to_epsg);

        let proj = Proj::new_known_crs(&from_crs, &to_crs, None).map_err(|e| {
            PipelineError::ReprojectionFailure(format!(
                "Failed to create Proj transformation {} -> {}: {}",
                from_crs, to_crs, e
            ))
        })?;

        Ok(ProjReprojector {
            proj,
            from_epsg,
            to_epsg,
        })
    }
}

#[cfg(feature = "proj")]
impl Reprojector for ProjReprojector {
    fn reproject_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let (x, y) = self.proj.convert((coord.x, coord.y)).map_err(|e| {
            PipelineError::ReprojectionFailure(format!(
                "EPSG:{} -> EPSG:{} at ({}, {}): {}",
                self.from_epsg, self.to_epsg, coord.x, coord.y, e
            ))
        })?;

        if !x.is_finite() || !y.is_finite() {
            return Err(PipelineError::ReprojectionFailure(format!(
                "EPSG:{} -> EPSG:{} at ({}, {}) produced a non-finite coordinate",
                self.from_epsg, self.to_epsg, coord.x, coord.y
            )));
        }

        Ok(Coord { x, y })
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    /// Bounds of a geometry, `None` when it has no coordinates
    pub fn of(geometry: &MultiPolygon<f64>) -> Option<Self> {
        geometry.bounding_rect().map(BoundingBox::from_rect)
    }
}

/// Open latitude interval used to cut the export down to one neighbourhood
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatitudeBand {
    pub min: f64,
    pub max: f64,
}

impl LatitudeBand {
    pub fn new(min: f64, max: f64) -> Self {
        LatitudeBand { min, max }
    }

    /// True when the box reaches into the band: `min_y < max && max_y > min`
    pub fn intersects(&self, bbox: &BoundingBox) -> bool {
        bbox.min_y < self.max && bbox.max_y > self.min
    }
}
