// Example: joining a few footprints with energy disclosures
// This example loads buildings from inline GeoJSON, sanitizes a small
// disclosure CSV and exports the Manhattan rows that reach a latitude band
use anyhow::Result;
use bldgenergygeo::collect::sanitize::sanitize_str;
use bldgenergygeo::geo_core::{IdentityReprojector, LatitudeBand};
use bldgenergygeo::geometric::building::BuildingTable;
use bldgenergygeo::geometric::energy::EnergyTable;
use bldgenergygeo::geometric::export::{select, write_geojson, ExportColumn, ExportFilter};
use bldgenergygeo::geometric::merge::MergedTable;

fn main() -> Result<()> {
    println!("=== Example: Footprints and LL84 disclosures ===\n");

    // Footprints already in longitude/latitude
    let geojson_data = r#"
    {
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {
                    "BBL": 1008350041,
                    "GROUND_ELE": 47,
                    "HEIGHT_ROO": 1250.0,
                    "Shape_Area": 79288.0,
                    "Shape_Leng": 1140.0
                },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [-73.9862, 40.7478],
                        [-73.9847, 40.7478],
                        [-73.9847, 40.7490],
                        [-73.9862, 40.7490],
                        [-73.9862, 40.7478]
                    ]]
                }
            },
            {
                "type": "Feature",
                "properties": {
                    "BBL": "1008350001",
                    "GROUND_ELE": 45,
                    "HEIGHT_ROO": 85.0,
                    "Shape_Area": 12000.0,
                    "Shape_Leng": 440.0
                },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [-73.9880, 40.7470],
                        [-73.9870, 40.7470],
                        [-73.9870, 40.7476],
                        [-73.9880, 40.7476],
                        [-73.9880, 40.7470]
                    ]]
                }
            }
        ]
    }
    "#;

    // The street name of the first row is split over two lines
    let raw_csv = "BBL,Street Number,Street Name,Primary Property Type - Self Selected,\
Property Floor Area (Buildngs and Parking)(ft2),Site EUI(kBtu/ft2),\
Weather Normalized Source EUI(kBtu/ft2),ENERGY STAR Score,\
Total GHG Emissions(MtCO2e),Number of Buildings
1008350041,  350, \"FIFTH
AVENUE\",Office,2768591,88.5,210.1,75,23000.5,1
2000010001,1,GRAND CONCOURSE,Multifamily Housing,50000,70,120,Not Available,300,2
";

    let mut buildings = BuildingTable::from_geojson_bytes(geojson_data.as_bytes())?;
    buildings.reproject(&IdentityReprojector)?;
    println!("Buildings loaded: {}", buildings.len());

    let (cleaned, stats) = sanitize_str(raw_csv, "inline.csv")?;
    println!(
        "Sanitized CSV: {} lines, {} records, {} joined",
        stats.lines_read, stats.records_emitted, stats.records_joined
    );
    let energy = EnergyTable::from_sanitized_reader(cleaned.as_bytes(), "inline.csv")?;
    println!("Energy rows loaded: {}", energy.len());

    let merged = MergedTable::outer_join(buildings, energy);
    let summary = merged.summary();
    println!(
        "Merged rows: {} (geometry {}, energy {}, both {})",
        summary.merged, summary.with_geometry, summary.with_energy, summary.with_both
    );

    let filter = ExportFilter::new(1, LatitudeBand::new(40.74, 40.76));
    let (records, _) = select(&merged, &filter, &ExportColumn::defaults());

    println!("\nExported features:");
    for record in &records {
        println!("  {} -> {:?}", record.id, record.properties.get("Address"));
    }

    std::fs::create_dir_all("./output")?;
    write_geojson(std::path::Path::new("./output/bldgsenergygeo.json"), &records)?;
    println!("\nGeoJSON saved to ./output/bldgsenergygeo.json");

    Ok(())
}
