//! Fixed-column frame tables: collection, blank filling, csv export.

use crate::Result;
use crate::config::AnalyzeConfig;
use crate::record::{FrameReader, extract_field};
use anyhow::{Context, bail};
use log::{debug, info, warn};
use serde_json::{Number, Value};
use std::path::{Path, PathBuf};

/// Rows are frames, columns the requested field paths in sorted order.
/// Missing cells are `Null` until [`fill_blanks`] runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(fields: &[String]) -> Self {
        let mut columns: Vec<String> = fields.to_vec();
        columns.sort();
        columns.dedup();
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, name: &str) -> Option<&Value> {
        let col = self.column_index(name)?;
        self.rows.get(row)?.get(col)
    }

    /// A column is numeric when every filled cell is a number and at least
    /// one cell is.
    pub fn is_numeric_column(&self, col: usize) -> bool {
        let mut seen = false;
        for row in &self.rows {
            match &row[col] {
                Value::Number(_) => seen = true,
                Value::Null => {}
                _ => return false,
            }
        }
        seen
    }

    /// Mean over the numeric cells of a column; None when there are none.
    pub fn column_mean(&self, col: usize) -> Option<f64> {
        let values: Vec<f64> = self
            .rows
            .iter()
            .filter_map(|row| row[col].as_f64())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(crate::stats::mean(&values))
        }
    }

    /// Restrict to the given columns (sorted). Every requested column must
    /// be present; a miss means the source file does not match the run.
    pub fn project(&self, fields: &[String]) -> Result<Table> {
        let mut wanted: Vec<String> = fields.to_vec();
        wanted.sort();
        wanted.dedup();

        let mut indices = Vec::with_capacity(wanted.len());
        for name in &wanted {
            let idx = self
                .column_index(name)
                .with_context(|| format!("csv file is missing requested column {name}"))?;
            indices.push(idx);
        }
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Table {
            columns: wanted,
            rows,
        })
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let indices: Vec<usize> = (0..self.rows.len()).collect();
        self.write_csv_rows(path, &indices)
    }

    /// Write only the given rows (used for per-span exports).
    pub fn write_csv_rows(&self, path: &Path, rows: &[usize]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("create csv file {}", path.display()))?;
        writer.write_record(&self.columns)?;
        for &i in rows {
            let row = self
                .rows
                .get(i)
                .with_context(|| format!("row {i} out of range"))?;
            writer.write_record(row.iter().map(value_to_string))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Collect a frame table from an arctan log, or load a previously exported
/// csv directly. A missing field in one record stores `Null` rather than
/// aborting the run.
pub fn collect_frame_data(filename: &str, fields: &[String], cfg: &AnalyzeConfig) -> Result<Table> {
    if filename.ends_with(".csv") {
        let table = read_csv(filename)?;
        if cfg.filter_csv {
            return table.project(fields);
        }
        return Ok(table);
    }

    // Otherwise assume an arctan-format log.
    let mut table = Table::new(fields);
    for record in FrameReader::open(filename)? {
        let record = record?;
        let mut row = Vec::with_capacity(table.columns.len());
        for key in &table.columns {
            row.push(extract_field(&record, key)?.unwrap_or(Value::Null));
        }
        table.rows.push(row);
    }
    debug!(
        "collected {} rows x {} columns from {}",
        table.rows.len(),
        table.columns.len(),
        filename
    );
    Ok(table)
}

/// Fill policy: timer columns are zero when unrecorded, everything else is
/// intermittently recorded and persists until changed, so forward-fill.
pub fn fill_blanks(table: &mut Table) {
    debug!("fill_blanks");
    for col in 0..table.columns.len() {
        if table.columns[col].starts_with("Timers.") {
            for row in &mut table.rows {
                if row[col].is_null() {
                    row[col] = Value::from(0.0);
                }
            }
        } else {
            let mut last = Value::Null;
            for row in &mut table.rows {
                if row[col].is_null() {
                    row[col] = last.clone();
                } else {
                    last = row[col].clone();
                }
            }
        }
    }
}

/// Export a table to csv. `"auto"` derives a name from the session identity
/// columns. Unsupported extensions and unwritable targets are skipped, not
/// fatal: the return value says whether a file was produced.
pub fn export(filename: &str, table: &Table) -> Result<Option<PathBuf>> {
    let filename = if filename == "auto" {
        let name = default_export_name(table, "performance")?;
        info!("saving to {name}");
        name
    } else {
        filename.to_string()
    };

    if !filename.ends_with(".csv") {
        warn!("unknown extension for export {filename}");
        return Ok(None);
    }

    let path = PathBuf::from(filename);
    match table.write_csv(&path) {
        Ok(()) => Ok(Some(path)),
        Err(err) => {
            warn!("export to {} failed: {:#}", path.display(), err);
            Ok(None)
        }
    }
}

/// `<prefix>_<first 6 of host id>_<session uuid>.csv`, with timestamp
/// punctuation normalized so the name is filesystem-safe.
pub fn default_export_name(table: &Table, prefix: &str) -> Result<String> {
    let unique_id = table
        .cell(0, "Session.UniqueHostID")
        .context("auto-naming needs a Session.UniqueHostID column with data")?;
    let session_id = table
        .cell(0, "Session.UniqueSessionUUID")
        .context("auto-naming needs a Session.UniqueSessionUUID column with data")?;

    let host: String = value_to_string(unique_id).chars().take(6).collect();
    let name = format!("{prefix}_{host}_{}.csv", value_to_string(session_id));
    Ok(name.replace(':', ".").replace('Z', "").replace('T', "-"))
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn read_csv(filename: &str) -> Result<Table> {
    let mut reader =
        csv::Reader::from_path(filename).with_context(|| format!("read csv file {filename}"))?;
    let columns: Vec<String> = reader
        .headers()
        .context("csv file has no header row")?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if columns.is_empty() {
        bail!("csv file {} has an empty header", filename);
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.with_context(|| format!("malformed csv row in {filename}"))?;
        rows.push(record.iter().map(parse_cell).collect());
    }
    debug!("loaded {} rows from {}", rows.len(), filename);
    Ok(Table { columns, rows })
}

fn parse_cell(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    match text.parse::<f64>() {
        Ok(x) => Number::from_f64(x)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
        Err(_) => Value::String(text.to_string()),
    }
}
