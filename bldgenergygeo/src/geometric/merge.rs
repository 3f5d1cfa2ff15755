use std::collections::BTreeSet;

#[cfg(feature = "polars")]
use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::commons::basic_functions::{borough_from_bbl, compose_address};
#[cfg(feature = "polars")]
use crate::error::Result;
use crate::geo_core::BoundingBox;
use crate::geometric::building::{BuildingRecord, BuildingTable};
use crate::geometric::energy::{EnergyRecord, EnergyTable};

/// One row of the outer join
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub bbl: String,
    pub building: Option<BuildingRecord>,
    pub energy: Option<EnergyRecord>,
    /// BBL present in the footprint table
    pub geometry_avail: bool,
    /// BBL present in the energy table
    pub energy_avail: bool,
    /// Street number and street name of the energy row
    pub address: Option<String>,
}

impl MergedRecord {
    fn new(
        bbl: String,
        building: Option<BuildingRecord>,
        energy: Option<EnergyRecord>,
        geometry_avail: bool,
        energy_avail: bool,
    ) -> Self {
        let address = energy.as_ref().and_then(|e| {
            compose_address(e.street_number.as_deref(), e.street_name.as_deref())
        });

        MergedRecord {
            bbl,
            building,
            energy,
            geometry_avail,
            energy_avail,
            address,
        }
    }

    pub fn boro(&self) -> Option<u8> {
        match &self.building {
            Some(b) => Some(b.boro),
            None => borough_from_bbl(&self.bbl),
        }
    }

    /// Bounds of the longitude/latitude footprint
    pub fn latlon_bounds(&self) -> Option<BoundingBox> {
        self.building
            .as_ref()
            .and_then(|b| b.geometry_latlon.as_ref())
            .and_then(BoundingBox::of)
    }

    pub fn has_both(&self) -> bool {
        self.geometry_avail && self.energy_avail
    }
}

/// Row counts of a merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub buildings: usize,
    pub energy: usize,
    pub merged: usize,
    pub with_geometry: usize,
    pub with_energy: usize,
    pub with_both: usize,
}

/// Outer join of footprints and energy rows, ordered by BBL
#[derive(Debug, Clone, Default)]
pub struct MergedTable {
    records: Vec<MergedRecord>,
    summary: MergeSummary,
}

impl MergedTable {
    /// Full outer join on BBL.
    ///
    /// A BBL repeated on one or both sides yields every pairing of its rows.
    /// The provenance flags come from the source indexes, not from which side
    /// of a joined row happens to be filled.
    pub fn outer_join(buildings: BuildingTable, energy: EnergyTable) -> Self {
        let building_rows = buildings.len();
        let energy_rows = energy.len();

        let mut building_groups = buildings.into_groups();
        let mut energy_groups = energy.into_groups();

        let keys: BTreeSet<String> = building_groups
            .keys()
            .chain(energy_groups.keys())
            .cloned()
            .collect();

        let mut records = Vec::with_capacity(keys.len());

        for bbl in keys {
            let geometry_avail = building_groups.contains_key(&bbl);
            let energy_avail = energy_groups.contains_key(&bbl);

            let left: Vec<Option<BuildingRecord>> = match building_groups.remove(&bbl) {
                Some(rows) => rows.into_iter().map(Some).collect(),
                None => vec![None],
            };
            let right: Vec<Option<EnergyRecord>> = match energy_groups.remove(&bbl) {
                Some(rows) => rows.into_iter().map(Some).collect(),
                None => vec![None],
            };

            for mut building in left {
                let last = right.len() - 1;
                for (j, energy) in right.iter().enumerate() {
                    let building = if j == last {
                        building.take()
                    } else {
                        building.clone()
                    };
                    records.push(MergedRecord::new(
                        bbl.clone(),
                        building,
                        energy.clone(),
                        geometry_avail,
                        energy_avail,
                    ));
                }
            }
        }

        let summary = MergeSummary {
            buildings: building_rows,
            energy: energy_rows,
            merged: records.len(),
            with_geometry: records.iter().filter(|r| r.geometry_avail).count(),
            with_energy: records.iter().filter(|r| r.energy_avail).count(),
            with_both: records.iter().filter(|r| r.has_both()).count(),
        };

        info!(
            buildings = summary.buildings,
            energy = summary.energy,
            merged = summary.merged,
            with_geometry = summary.with_geometry,
            with_energy = summary.with_energy,
            with_both = summary.with_both,
            "Merged footprints and energy data"
        );

        MergedTable { records, summary }
    }

    pub fn records(&self) -> &[MergedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> MergeSummary {
        self.summary
    }

    #[cfg(feature = "polars")]
    pub fn to_polars_df(&self) -> Result<DataFrame> {
        let rows: Vec<&MergedRecord> = self.records.iter().collect();
        rows_to_polars_df(&rows)
    }
}

/// Tabular view of merged rows for previews
#[cfg(feature = "polars")]
pub fn rows_to_polars_df(rows: &[&MergedRecord]) -> Result<DataFrame> {
    use crate::geometric::energy::Metric;

    let metric = |pick: fn(&EnergyRecord) -> &Option<Metric>| -> Vec<Option<f64>> {
        rows.iter()
            .map(|r| r.energy.as_ref().and_then(|e| pick(e).as_ref()).and_then(Metric::as_f64))
            .collect()
    };

    let bbl: Vec<&str> = rows.iter().map(|r| r.bbl.as_str()).collect();
    let boro: Vec<Option<u32>> = rows.iter().map(|r| r.boro().map(u32::from)).collect();
    let height: Vec<Option<f64>> = rows
        .iter()
        .map(|r| r.building.as_ref().and_then(|b| b.roof_height))
        .collect();
    let address: Vec<Option<&str>> = rows.iter().map(|r| r.address.as_deref()).collect();
    let geometry_avail: Vec<bool> = rows.iter().map(|r| r.geometry_avail).collect();
    let energy_avail: Vec<bool> = rows.iter().map(|r| r.energy_avail).collect();

    let df = df! [
        "BBL" => bbl,
        "boro" => boro,
        "HEIGHT_ROO" => height,
        "Site EUI(kBtu/ft2)" => metric(|e| &e.site_eui),
        "Total GHG Emissions(MtCO2e)" => metric(|e| &e.total_ghg),
        "Number of Buildings" => metric(|e| &e.number_of_buildings),
        "Address" => address,
        "geometry_avail" => geometry_avail,
        "energy_avail" => energy_avail,
    ]?;

    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn footprint(bbl: &str) -> BuildingRecord {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        BuildingRecord::new(bbl, MultiPolygon::new(vec![poly])).unwrap()
    }

    fn disclosure(bbl: &str, number: &str, name: &str) -> EnergyRecord {
        EnergyRecord {
            street_number: Some(number.to_string()),
            street_name: Some(name.to_string()),
            ..EnergyRecord::new(bbl)
        }
    }

    #[test]
    fn test_outer_join_cardinality() {
        let buildings = BuildingTable::new(vec![
            footprint("1000010001"),
            footprint("1000010002"),
            footprint("2000010001"),
        ]);
        let energy = EnergyTable::new(vec![
            disclosure("1000010002", "1", "BROADWAY"),
            disclosure("3000010001", "2", "FULTON STREET"),
        ]);

        let merged = MergedTable::outer_join(buildings, energy);

        // |geometry| + |energy| - |intersection|
        assert_eq!(merged.len(), 3 + 2 - 1);
        let summary = merged.summary();
        assert_eq!(summary.with_geometry, 3);
        assert_eq!(summary.with_energy, 2);
        assert_eq!(summary.with_both, 1);

        let bbls: Vec<&str> = merged.records().iter().map(|r| r.bbl.as_str()).collect();
        assert_eq!(bbls, vec!["1000010001", "1000010002", "2000010001", "3000010001"]);
    }

    #[test]
    fn test_flags_match_sources() {
        let merged = MergedTable::outer_join(
            BuildingTable::new(vec![footprint("1000010001"), footprint("1000010002")]),
            EnergyTable::new(vec![
                disclosure("1000010002", "1", "BROADWAY"),
                disclosure("4000010001", "9", "MAIN STREET"),
            ]),
        );

        for record in merged.records() {
            assert!(record.geometry_avail || record.energy_avail);
            assert_eq!(record.geometry_avail, record.building.is_some());
            assert_eq!(record.energy_avail, record.energy.is_some());
        }

        let both = &merged.records()[1];
        assert_eq!(both.bbl, "1000010002");
        assert!(both.has_both());
        assert_eq!(both.address.as_deref(), Some("1 BROADWAY"));

        let energy_only = &merged.records()[2];
        assert!(!energy_only.geometry_avail);
        assert_eq!(energy_only.boro(), Some(4));
    }

    #[test]
    fn test_duplicates_cross_product() {
        let merged = MergedTable::outer_join(
            BuildingTable::new(vec![
                footprint("1000010001"),
                footprint("1000010001"),
                footprint("1000010001"),
            ]),
            EnergyTable::new(vec![
                disclosure("1000010001", "1", "A"),
                disclosure("1000010001", "2", "B"),
            ]),
        );

        assert_eq!(merged.len(), 6);
        assert!(merged.records().iter().all(|r| r.has_both()));
        assert!(merged.records().iter().all(|r| r.building.is_some()));
        let addresses: BTreeSet<&str> = merged
            .records()
            .iter()
            .filter_map(|r| r.address.as_deref())
            .collect();
        assert_eq!(addresses.len(), 2);
    }

    #[test]
    fn test_empty_join() {
        let merged = MergedTable::outer_join(BuildingTable::default(), EnergyTable::default());
        assert!(merged.is_empty());
        assert_eq!(merged.summary(), MergeSummary::default());
    }

    #[cfg(feature = "polars")]
    #[test]
    fn test_to_polars_df() {
        let merged = MergedTable::outer_join(
            BuildingTable::new(vec![footprint("1000010001")]),
            EnergyTable::new(vec![disclosure("1000010001", "1", "BROADWAY")]),
        );
        let df = merged.to_polars_df().unwrap();
        assert_eq!(df.height(), 1);
        assert!(df.column("Address").is_ok());
        assert!(df.column("geometry_avail").is_ok());
    }
}
