//! Persistence layer for evaluation tables and run reports.
//!
//! Tables are saved as CSV (the interchange format with the scraping and
//! charting tools); reports are saved as JSON.

use crate::error::{EvalError, Result};
use crate::report::EvaluationReport;
use crate::table::Table;
use std::fs;
use std::path::Path;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Load a CSV table from a file.
pub fn load_table(path: &Path) -> Result<Table> {
    if !path.is_file() {
        return Err(EvalError::TableNotFound(path.to_path_buf()));
    }
    let file = fs::File::open(path).map_err(|e| EvalError::io(path, e))?;
    Table::from_reader(file)
}

/// Save a table as CSV, creating the parent directory if needed.
pub fn save_table(table: &Table, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let mut buf = Vec::new();
    table.write_csv(&mut buf)?;
    fs::write(path, &buf).map_err(|e| EvalError::io(path, e))?;
    Ok(())
}

/// Save a run report as pretty JSON.
pub fn save_report(report: &EvaluationReport, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).map_err(|e| EvalError::io(path, e))?;
    Ok(())
}
