use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, info_span};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::geo_core::Reprojector;
use crate::geometric::building::BuildingTable;
use crate::geometric::energy::EnergyTable;
use crate::geometric::export::{select, write_geojson, FilterCounts};
use crate::geometric::merge::{MergeSummary, MergedTable};
use crate::topology::TopologyConverter;

/// What a run read, joined and wrote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub footprints: usize,
    pub footprints_skipped: usize,
    pub energy_rows: usize,
    pub energy_skipped: usize,
    pub merge: MergeSummary,
    pub filter: FilterCounts,
    pub exported: usize,
    pub geojson: PathBuf,
    pub topojson: Option<PathBuf>,
}

/// Result of a run, keeping the merged table for previews
#[derive(Debug)]
pub struct PipelineRun {
    pub report: RunReport,
    pub merged: MergedTable,
}

/// Run the four stages in order: load both sources, reproject and merge, export.
///
/// Topology conversion happens only when a converter is passed. The GeoJSON
/// file is written only once both inputs have loaded and is complete before
/// the converter starts.
pub fn run(
    config: &PipelineConfig,
    reprojector: &dyn Reprojector,
    converter: Option<&dyn TopologyConverter>,
) -> Result<PipelineRun> {
    config.validate()?;
    let started = Instant::now();

    let buildings = {
        let _span = info_span!("geometry").entered();
        let t = Instant::now();
        let buildings = BuildingTable::from_path(&config.inputs.footprints)?;
        info!(elapsed_ms = t.elapsed().as_millis() as u64, "Geometry stage done");
        buildings
    };

    let energy = {
        let _span = info_span!("energy").entered();
        let t = Instant::now();
        let cleaned = config.cleaned_energy_path();
        let energy = EnergyTable::from_csv_path(&config.inputs.energy, Some(&cleaned))?;
        info!(elapsed_ms = t.elapsed().as_millis() as u64, "Energy stage done");
        energy
    };

    let footprints = buildings.len();
    let footprints_skipped = buildings.skipped();
    let energy_rows = energy.len();
    let energy_skipped = energy.skipped();

    let merged = {
        let _span = info_span!("merge").entered();
        let t = Instant::now();
        let mut buildings = buildings;
        buildings.reproject(reprojector)?;
        let merged = MergedTable::outer_join(buildings, energy);
        info!(elapsed_ms = t.elapsed().as_millis() as u64, "Merge stage done");
        merged
    };

    let (filter, exported) = {
        let _span = info_span!("export").entered();
        let t = Instant::now();
        let (records, counts) = select(&merged, &config.export_filter(), &config.export.columns);
        write_geojson(&config.output.geojson, &records)?;
        info!(elapsed_ms = t.elapsed().as_millis() as u64, "Export stage done");
        (counts, records.len())
    };

    let topojson = match converter {
        Some(converter) => {
            let _span = info_span!("topology").entered();
            converter.convert(&config.output.geojson, &config.output.topojson)?;
            Some(config.output.topojson.clone())
        }
        None => None,
    };

    let report = RunReport {
        footprints,
        footprints_skipped,
        energy_rows,
        energy_skipped,
        merge: merged.summary(),
        filter,
        exported,
        geojson: config.output.geojson.clone(),
        topojson,
    };

    info!(
        exported = report.exported,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Pipeline finished"
    );

    Ok(PipelineRun { report, merged })
}

/// Run with the reprojector and converter the configuration describes
pub fn run_with_config(config: &PipelineConfig) -> Result<PipelineRun> {
    let reprojector = config.geo_core().reprojector()?;
    let converter = config.topology.converter.clone();
    let converter: Option<&dyn TopologyConverter> = if config.topology.enabled {
        Some(&converter)
    } else {
        None
    };
    run(config, reprojector.as_ref(), converter)
}
