use csv::{ErrorKind, ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::collect::sanitize::{decode_text, sanitize_str};
use crate::commons::basic_functions::{non_empty, normalize_bbl};
use crate::error::{PipelineError, Result};

pub const BBL: &str = "BBL";
pub const STREET_NUMBER: &str = "Street Number";
pub const STREET_NAME: &str = "Street Name";
pub const PRIMARY_PROPERTY_TYPE: &str = "Primary Property Type - Self Selected";
pub const FLOOR_AREA: &str = "Property Floor Area (Buildngs and Parking)(ft2)";
pub const SITE_EUI: &str = "Site EUI(kBtu/ft2)";
pub const SOURCE_EUI: &str = "Weather Normalized Source EUI(kBtu/ft2)";
pub const ENERGY_STAR_SCORE: &str = "ENERGY STAR Score";
pub const TOTAL_GHG: &str = "Total GHG Emissions(MtCO2e)";
pub const NUMBER_OF_BUILDINGS: &str = "Number of Buildings";

/// Disclosure columns kept from the Local Law 84 file
pub const ENERGY_COLUMNS: [&str; 10] = [
    BBL,
    STREET_NUMBER,
    STREET_NAME,
    PRIMARY_PROPERTY_TYPE,
    FLOOR_AREA,
    SITE_EUI,
    SOURCE_EUI,
    ENERGY_STAR_SCORE,
    TOTAL_GHG,
    NUMBER_OF_BUILDINGS,
];

/// A disclosure value: a number, or free text such as `Not Available`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    Number(f64),
    Text(String),
}

impl Metric {
    /// Blank cells are absent, numeric cells become numbers, the rest stays text
    pub fn parse(raw: &str) -> Option<Metric> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Some(Metric::Number(n)),
            _ => Some(Metric::Text(trimmed.to_string())),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Metric::Number(n) => Some(*n),
            Metric::Text(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Metric::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Metric::Text(s) => Value::String(s.clone()),
        }
    }
}

/// One row of the energy disclosure
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnergyRecord {
    pub bbl: String,
    pub street_number: Option<String>,
    pub street_name: Option<String>,
    pub primary_property_type: Option<String>,
    pub floor_area: Option<Metric>,
    pub site_eui: Option<Metric>,
    pub source_eui: Option<Metric>,
    pub energy_star_score: Option<Metric>,
    pub total_ghg: Option<Metric>,
    pub number_of_buildings: Option<Metric>,
}

impl EnergyRecord {
    pub fn new(bbl: impl Into<String>) -> Self {
        EnergyRecord {
            bbl: bbl.into(),
            ..Default::default()
        }
    }
}

/// Header positions of the kept columns
struct ColumnMap {
    positions: [usize; 10],
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord, input: &str) -> Result<Self> {
        let mut positions = [0usize; 10];
        let mut missing = Vec::new();

        for (slot, column) in ENERGY_COLUMNS.iter().enumerate() {
            match headers.iter().position(|h| h.trim() == *column) {
                Some(pos) => positions[slot] = pos,
                None => missing.push(column.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch {
                input: input.to_string(),
                missing,
            });
        }
        Ok(ColumnMap { positions })
    }

    fn cell<'r>(&self, record: &'r StringRecord, slot: usize) -> &'r str {
        record.get(self.positions[slot]).unwrap_or("")
    }
}

/// Energy rows sorted and indexed by BBL
#[derive(Debug, Clone, Default)]
pub struct EnergyTable {
    records: Vec<EnergyRecord>,
    index: BTreeMap<String, Vec<usize>>,
    skipped: usize,
}

impl EnergyTable {
    pub fn new(mut records: Vec<EnergyRecord>) -> Self {
        records.sort_by(|a, b| a.bbl.cmp(&b.bbl));

        let mut index: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, record) in records.iter().enumerate() {
            index.entry(record.bbl.clone()).or_default().push(i);
        }

        EnergyTable {
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

    pub fn get(&self, bbl: &str) -> Vec<&EnergyRecord> {
        self.index
            .get(bbl)
            .map(|rows| rows.iter().map(|&i| &self.records[i]).collect())
            .unwrap_or_default()
    }

    pub fn records(&self) -> &[EnergyRecord] {
        &self.records
    }

    pub fn unique_bbls(&self) -> usize {
        self.index.len()
    }

    /// Rows dropped because their BBL cell was blank
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn into_groups(self) -> BTreeMap<String, Vec<EnergyRecord>> {
        let mut groups: BTreeMap<String, Vec<EnergyRecord>> = BTreeMap::new();
        for record in self.records {
            groups.entry(record.bbl.clone()).or_default().push(record);
        }
        groups
    }

    /// Load the raw disclosure file: decode, sanitize, parse.
    /// When `cleaned_output` is given the sanitized text is written there too.
    pub fn from_csv_path(path: &Path, cleaned_output: Option<&Path>) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::InputNotFound(path.to_path_buf()));
        }

        let input = path.display().to_string();
        let bytes = fs::read(path)?;
        let text = decode_text(&bytes);
        let (cleaned, stats) = sanitize_str(&text, &input)?;

        info!(
            input = %input,
            lines = stats.lines_read,
            records = stats.records_emitted,
            joined = stats.records_joined,
            "Sanitized energy CSV"
        );

        if let Some(out) = cleaned_output {
            fs::write(out, &cleaned)?;
            info!(output = %out.display(), "Wrote cleaned energy CSV");
        }

        Self::from_sanitized_reader(cleaned.as_bytes(), &input)
    }

    /// Parse already-sanitized CSV text
    pub fn from_sanitized_reader<R: Read>(reader: R, input: &str) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let columns = ColumnMap::from_headers(&headers, input)?;

        let mut records = Vec::new();
        let mut skipped = 0usize;

        for result in rdr.records() {
            let row = result.map_err(|e| csv_error(e, input))?;

            let Some(bbl) = normalize_bbl(columns.cell(&row, 0)) else {
                skipped += 1;
                let line = row.position().map(|p| p.line()).unwrap_or(0);
                warn!(line, "Skipping energy row without BBL");
                continue;
            };

            records.push(EnergyRecord {
                bbl,
                street_number: non_empty(columns.cell(&row, 1)),
                street_name: non_empty(columns.cell(&row, 2)),
                primary_property_type: non_empty(columns.cell(&row, 3)),
                floor_area: Metric::parse(columns.cell(&row, 4)),
                site_eui: Metric::parse(columns.cell(&row, 5)),
                source_eui: Metric::parse(columns.cell(&row, 6)),
                energy_star_score: Metric::parse(columns.cell(&row, 7)),
                total_ghg: Metric::parse(columns.cell(&row, 8)),
                number_of_buildings: Metric::parse(columns.cell(&row, 9)),
            });
        }

        let mut table = Self::new(records);
        table.skipped = skipped;

        info!(
            input,
            rows = table.len(),
            unique_bbls = table.unique_bbls(),
            skipped,
            "Loaded energy disclosure"
        );
        Ok(table)
    }
}

/// Field-count drift after sanitizing means the quote heuristic lost track
fn csv_error(e: csv::Error, input: &str) -> PipelineError {
    if let ErrorKind::UnequalLengths {
        pos,
        expected_len,
        len,
    } = e.kind()
    {
        let line = pos.as_ref().map(|p| p.line() as usize).unwrap_or(0);
        return PipelineError::malformed(
            input,
            line,
            format!("expected {} fields, found {}", expected_len, len),
        );
    }
    PipelineError::Csv(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn header() -> String {
        let mut columns: Vec<&str> = vec!["Record Number"];
        columns.extend(ENERGY_COLUMNS.iter());
        columns.push("Notes");
        columns.join(",")
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!(Metric::parse(" 81.5 "), Some(Metric::Number(81.5)));
        assert_eq!(
            Metric::parse("Not Available"),
            Some(Metric::Text("Not Available".to_string()))
        );
        assert_eq!(Metric::parse(""), None);
        assert_eq!(Metric::parse("NaN"), Some(Metric::Text("NaN".to_string())));
        assert_eq!(Metric::Number(2.0).to_json(), serde_json::json!(2.0));
    }

    #[test]
    fn test_parse_selects_columns_by_name() {
        let csv = format!(
            "{}\n7,1000010001.0,350,5 AVENUE,Office,2768591,98.2,210.4,74,18203.4,1,ok\n\
             8,,1,NOWHERE,Office,1,1,1,1,1,1,x\n",
            header()
        );
        let table = EnergyTable::from_sanitized_reader(csv.as_bytes(), "test").unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.skipped(), 1);
        let record = table.get("1000010001")[0];
        assert_eq!(record.street_number.as_deref(), Some("350"));
        assert_eq!(record.street_name.as_deref(), Some("5 AVENUE"));
        assert_eq!(record.primary_property_type.as_deref(), Some("Office"));
        assert_eq!(record.site_eui, Some(Metric::Number(98.2)));
        assert_eq!(record.energy_star_score, Some(Metric::Number(74.0)));
        assert_eq!(record.number_of_buildings, Some(Metric::Number(1.0)));
    }

    #[test]
    fn test_missing_columns() {
        let csv = "BBL,Street Number,Street Name\n1000010001,1,BROADWAY\n";
        match EnergyTable::from_sanitized_reader(csv.as_bytes(), "ll84.csv") {
            Err(PipelineError::SchemaMismatch { input, missing }) => {
                assert_eq!(input, "ll84.csv");
                assert_eq!(missing.len(), 7);
                assert!(missing.contains(&SITE_EUI.to_string()));
            }
            other => panic!("unexpected result: {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn test_field_count_drift_is_malformed() {
        let csv = format!(
            "{}\n7,1000010001,350,5 AVENUE,Office,1,2,3,4,5,1,ok\n8,1000010002,1\n",
            header()
        );
        let err = EnergyTable::from_sanitized_reader(csv.as_bytes(), "test").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { record: 3, .. }));
    }

    #[test]
    fn test_from_csv_path_sanitizes_multiline_notes() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "{}\n7,1000010001,350,  5   AVENUE,Office,1,2,3,4,5,1,\"line one\nline two\"\n",
            header()
        )
        .unwrap();

        let cleaned = NamedTempFile::new().unwrap();
        let table = EnergyTable::from_csv_path(file.path(), Some(cleaned.path())).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get("1000010001")[0].street_name.as_deref(),
            Some("5 AVENUE")
        );
        let cleaned_text = fs::read_to_string(cleaned.path()).unwrap();
        assert_eq!(cleaned_text.lines().count(), 2);
        assert!(cleaned_text.contains("\"line one line two\""));
    }

    #[test]
    fn test_missing_file() {
        let err = EnergyTable::from_csv_path(Path::new("/nonexistent/ll84.csv"), None).unwrap_err();
        assert!(matches!(err, PipelineError::InputNotFound(_)));
    }

    #[test]
    fn test_duplicate_bbls_are_kept() {
        let table = EnergyTable::new(vec![
            EnergyRecord::new("2"),
            EnergyRecord::new("1"),
            EnergyRecord::new("2"),
        ]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.unique_bbls(), 2);
        assert_eq!(table.records()[0].bbl, "1");
        assert_eq!(table.get("2").len(), 2);
    }
}
