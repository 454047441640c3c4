// Module for loading lead batches from csv and exporting the result tables.
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::error::{LeadScoreError, Result};

/// One row of the uploaded lead sheet. Empty cells come through as `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LeadRecord {
    #[serde(default)] pub lead_id: Option<String>,
    #[serde(default)] pub name: Option<String>,
    #[serde(default)] pub budget_min: Option<f64>,
    #[serde(default)] pub budget_max: Option<f64>,
    #[serde(default)] pub preferred_area: Option<String>,
    #[serde(default)] pub user_type: Option<String>,
    #[serde(default, deserialize_with = "whole_number")] pub bhk: Option<u32>,
    #[serde(default)] pub move_in_time: Option<String>,
    #[serde(default)] pub source: Option<String>,
}

/// Accept `2` as well as the `2.0` spreadsheets export; reject fractions.
fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<u32>, D::Error> {
    let value: Option<f64> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(v) if v.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&v) => Ok(Some(v as u32)),
        Some(v) => Err(serde::de::Error::custom(format!("expected a whole number, got {}", v))),
    }
}

impl LeadRecord {
    /// Whether the cell for `column` is empty. Unknown columns count as
    /// present.
    pub fn is_missing(&self, column: &str) -> bool {
        match column {
            "lead_id" => self.lead_id.is_none(),
            "name" => self.name.is_none(),
            "budget_min" => self.budget_min.is_none(),
            "budget_max" => self.budget_max.is_none(),
            "preferred_area" => self.preferred_area.is_none(),
            "user_type" => self.user_type.is_none(),
            "bhk" => self.bhk.is_none(),
            "move_in_time" => self.move_in_time.is_none(),
            "source" => self.source.is_none(),
            _ => false,
        }
    }
}

/// A batch of leads together with the header it was read with.
#[derive(Debug, Clone, Default)]
pub struct LeadTable {
    pub columns: Vec<String>,
    pub records: Vec<LeadRecord>,
}

impl LeadTable {
    pub const ALL_COLUMNS: [&'static str; 9] = [
        "lead_id",
        "name",
        "budget_min",
        "budget_max",
        "preferred_area",
        "user_type",
        "bhk",
        "move_in_time",
        "source",
    ];

    /// Table built in memory: every known column is considered present.
    pub fn from_records(records: Vec<LeadRecord>) -> Self {
        LeadTable {
            columns: Self::ALL_COLUMNS.iter().map(|c| c.to_string()).collect(),
            records,
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Empty cells across the columns the batch was read with.
    pub fn missing_cells(&self) -> usize {
        self.records
            .iter()
            .map(|r| self.columns.iter().filter(|c| r.is_missing(c)).count())
            .sum()
    }
}

pub fn load_leads(path: impl AsRef<Path>) -> Result<LeadTable> {
    let file = File::open(path.as_ref())?;
    read_leads(file)
}

/// Read a lead batch from any csv source.
///
/// Blank lines and rows with the wrong number of fields are skipped with a
/// warning. A cell that cannot be parsed into its column type fails the whole
/// batch with a schema error.
pub fn read_leads<R: Read>(reader: R) -> Result<LeadTable> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b',')
        .flexible(true)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let expected_len = headers.len();
    let columns: Vec<String> = headers.iter().map(|h| h.to_string()).collect();

    let mut records = Vec::new();
    for result in rdr.records() {
        let raw: StringRecord = result?;
        let line = raw.position().map(|p| p.line()).unwrap_or(0);

        if raw.iter().all(|f| f.is_empty()) {
            continue;
        }

        if raw.len() != expected_len {
            warn!(
                line,
                expected = expected_len,
                found = raw.len(),
                "skipping row with wrong field count"
            );
            continue;
        }

        let rec: LeadRecord = raw
            .deserialize(Some(&headers))
            .map_err(|e| LeadScoreError::Schema(format!("malformed record at line {}: {}", line, e)))?;
        records.push(rec);
    }

    debug!(rows = records.len(), columns = columns.len(), "read lead batch");
    Ok(LeadTable { columns, records })
}

/// Write any serializable rows as a csv table with a header line.
pub fn write_csv<T: Serialize, W: Write>(writer: W, rows: &[T]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_csv<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_csv(file, rows)
}
