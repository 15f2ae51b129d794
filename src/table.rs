//! Tabular representation of similarity records.
//!
//! A [`Table`] is an ordered set of named string columns read from and
//! written to CSV. Each row pairs an AI-generated brief with its
//! human-written reference, one column per [`Section`] and side.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// One section of a case brief.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Facts,
    Issue,
    Decision,
    Reasons,
    Ratio,
}

impl Section {
    /// All sections in table order.
    pub const ALL: [Section; 5] = [
        Section::Facts,
        Section::Issue,
        Section::Decision,
        Section::Reasons,
        Section::Ratio,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Section::Facts => "facts",
            Section::Issue => "issue",
            Section::Decision => "decision",
            Section::Reasons => "reasons",
            Section::Ratio => "ratio",
        }
    }

    /// Column holding the AI-generated text, e.g. `ai_facts`.
    pub fn ai_column(&self) -> String {
        format!("ai_{}", self.name())
    }

    /// Column holding the human reference text, e.g. `human_facts`.
    pub fn human_column(&self) -> String {
        format!("human_{}", self.name())
    }

    /// Column the score is written to, e.g. `facts_similarity`.
    pub fn similarity_column(&self) -> String {
        format!("{}_similarity", self.name())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The ten paired text columns every input table must carry.
pub fn required_columns() -> Vec<String> {
    Section::ALL
        .iter()
        .flat_map(|s| [s.ai_column(), s.human_column()])
        .collect()
}

/// Cell values upstream tables use to mean "no value".
const MISSING_MARKERS: &[&str] = &[
    "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "#N/A", "<NA>",
];

/// Whether a cell is blank or holds a null marker.
pub fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || MISSING_MARKERS.contains(&trimmed)
}

/// An in-memory table of string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Read a CSV table with a header row.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let headers = rdr.headers()?.iter().map(String::from).collect();
        let mut table = Table::new(headers);

        for record in rdr.records() {
            let record = record?;
            table.rows.push(record.iter().map(String::from).collect());
        }

        Ok(table)
    }

    /// Parse a CSV table from a string.
    pub fn from_csv_str(content: &str) -> Result<Self> {
        Self::from_reader(content.as_bytes())
    }

    /// Write the table as CSV, header row first.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()
            .map_err(|e| EvalError::Csv(format!("flush failed: {}", e)))?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only the first `n` rows.
    pub fn truncate(&mut self, n: usize) {
        self.rows.truncate(n);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Fail with every absent column name if any of `required` is missing.
    pub fn validate_columns(&self, required: &[String]) -> Result<()> {
        let missing: Vec<String> = required
            .iter()
            .filter(|c| self.column_index(c).is_none())
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EvalError::MissingColumns(missing))
        }
    }

    /// The (ai, human) column indices of every section, in section order.
    ///
    /// Fails with every absent column name if any is missing.
    pub fn passage_columns(&self) -> Result<Vec<(Section, usize, usize)>> {
        self.validate_columns(&required_columns())?;

        Section::ALL
            .iter()
            .map(|section| {
                Ok((
                    *section,
                    self.require_column(&section.ai_column())?,
                    self.require_column(&section.human_column())?,
                ))
            })
            .collect()
    }

    fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| EvalError::MissingColumns(vec![name.to_string()]))
    }

    /// Raw cell text.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Cell text as a passage; blank cells and null markers are `None`.
    pub fn passage(&self, row: usize, column: usize) -> Option<&str> {
        self.cell(row, column).filter(|v| !is_missing(v))
    }

    /// Index of `name`, appending an empty column if it does not exist.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(index) = self.column_index(name) {
            return index;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    pub fn set_cell(&mut self, row: usize, column: usize, value: String) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value;
        }
    }
}
