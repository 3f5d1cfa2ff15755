use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::{PipelineError, Result};

/// Kinds of footprint input, chosen by file extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FootprintSource {
    GeoJson(PathBuf),
    Shapefile(PathBuf),
    Zip(PathBuf),
}

impl FootprintSource {
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::InputNotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase());

        match extension.as_deref() {
            Some("shp") => Ok(FootprintSource::Shapefile(path.to_path_buf())),
            Some("zip") => Ok(FootprintSource::Zip(path.to_path_buf())),
            Some("json") | Some("geojson") => Ok(FootprintSource::GeoJson(path.to_path_buf())),
            _ => Err(PipelineError::Config(format!(
                "Unsupported footprint input {:?}: expected .shp, .zip, .geojson or .json",
                path
            ))),
        }
    }
}

/// A GeoJSON file ready to stream, with the scratch directory that backs it
pub struct PreparedGeoJson {
    pub path: PathBuf,
    _scratch: Option<TempDir>,
}

/// Turn any supported footprint input into a GeoJSON file on disk
pub fn prepare_geojson(source: &FootprintSource) -> Result<PreparedGeoJson> {
    match source {
        FootprintSource::GeoJson(path) => Ok(PreparedGeoJson {
            path: path.clone(),
            _scratch: None,
        }),
        FootprintSource::Shapefile(path) => {
            let scratch = TempDir::new()?;
            let geojson = ogr2ogr_to_geojson(path, scratch.path())?;
            Ok(PreparedGeoJson {
                path: geojson,
                _scratch: Some(scratch),
            })
        }
        FootprintSource::Zip(path) => {
            let scratch = extract_zip(path)?;
            let shp = find_shapefile(scratch.path())?;
            let geojson = ogr2ogr_to_geojson(&shp, scratch.path())?;
            Ok(PreparedGeoJson {
                path: geojson,
                _scratch: Some(scratch),
            })
        }
    }
}

/// Extract a zip archive into a fresh temporary directory
pub fn extract_zip(path: &Path) -> Result<TempDir> {
    let file = fs::File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    let temp_dir = TempDir::new()?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let Some(relative) = file.enclosed_name().map(Path::to_path_buf) else {
            debug!(name = file.name(), "Skipping zip entry outside the archive root");
            continue;
        };
        let outpath = temp_dir.path().join(relative);

        if file.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = fs::File::create(&outpath)?;
            std::io::copy(&mut file, &mut outfile)?;
        }
    }

    info!(archive = %path.display(), entries = archive.len(), "Extracted footprint archive");
    Ok(temp_dir)
}

/// First `.shp` file found below `dir`
pub fn find_shapefile(dir: &Path) -> Result<PathBuf> {
    find_shapefile_recursive(dir)?.ok_or_else(|| {
        PipelineError::InputNotFound(dir.join("*.shp"))
    })
}

fn find_shapefile_recursive(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            if let Some(found) = find_shapefile_recursive(&path)? {
                return Ok(Some(found));
            }
        } else if path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("shp"))
        {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Convert a shapefile to GeoJSON with the `ogr2ogr` tool.
/// Coordinates stay in the shapefile's own reference.
pub fn ogr2ogr_to_geojson(shp: &Path, out_dir: &Path) -> Result<PathBuf> {
    let stem = shp
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "footprints".to_string());
    let output = out_dir.join(format!("{}.geojson", stem));

    info!(shapefile = %shp.display(), "Converting shapefile with ogr2ogr");

    let status = Command::new("ogr2ogr")
        .arg("-f")
        .arg("GeoJSON")
        .arg(&output)
        .arg(shp)
        .status()
        .map_err(|e| {
            PipelineError::ExternalConverterFailure(format!(
                "Failed to execute ogr2ogr ({}). Is GDAL installed and on PATH?",
                e
            ))
        })?;

    if !status.success() {
        return Err(PipelineError::ExternalConverterFailure(format!(
            "ogr2ogr exited with {} converting {}",
            status,
            shp.display()
        )));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_source_from_extension() {
        let dir = TempDir::new().unwrap();
        let geojson = dir.path().join("bldgs.GeoJSON");
        fs::write(&geojson, "{}").unwrap();
        assert_eq!(
            FootprintSource::from_path(&geojson).unwrap(),
            FootprintSource::GeoJson(geojson.clone())
        );

        let csv = dir.path().join("bldgs.csv");
        fs::write(&csv, "").unwrap();
        assert!(matches!(
            FootprintSource::from_path(&csv),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_missing_input() {
        let err = FootprintSource::from_path(Path::new("/nonexistent/building_1214.shp"));
        assert!(matches!(err, Err(PipelineError::InputNotFound(_))));
    }

    #[test]
    fn test_extract_zip_and_find_shapefile() {
        let dir = TempDir::new().unwrap();
        let archive_path = dir.path().join("footprints.zip");
        {
            let file = fs::File::create(&archive_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let options = zip::write::FileOptions::default();
            zip.start_file("building_1214/building_1214.dbf", options)
                .unwrap();
            zip.write_all(b"dbf").unwrap();
            zip.start_file("building_1214/building_1214.shp", options)
                .unwrap();
            zip.write_all(b"shp").unwrap();
            zip.finish().unwrap();
        }

        let extracted = extract_zip(&archive_path).unwrap();
        let shp = find_shapefile(extracted.path()).unwrap();
        assert!(shp.ends_with("building_1214/building_1214.shp"));
    }

    #[test]
    fn test_find_shapefile_none() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            find_shapefile(dir.path()),
            Err(PipelineError::InputNotFound(_))
        ));
    }
}
