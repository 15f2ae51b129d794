//! Run summaries: per-section outcome counts and per-model averages.

use crate::error::Result;
use crate::scorer::CellOutcome;
use crate::table::{Section, Table, is_missing};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Outcome counts and mean score for one section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionSummary {
    pub section: Section,
    pub scored: usize,
    pub absent: usize,
    pub degenerate: usize,
    pub failed: usize,
    /// Mean over scored cells.
    pub mean: Option<f64>,
}

impl SectionSummary {
    pub fn new(section: Section) -> Self {
        Self {
            section,
            scored: 0,
            absent: 0,
            degenerate: 0,
            failed: 0,
            mean: None,
        }
    }

    /// Tally a column of outcomes.
    pub fn from_outcomes<'a>(
        section: Section,
        outcomes: impl IntoIterator<Item = &'a CellOutcome>,
    ) -> Self {
        let mut summary = Self::new(section);
        let mut total = 0.0f64;

        for outcome in outcomes {
            match outcome {
                CellOutcome::Scored(score) => {
                    summary.scored += 1;
                    total += f64::from(*score);
                }
                CellOutcome::Absent => summary.absent += 1,
                CellOutcome::Degenerate => summary.degenerate += 1,
                CellOutcome::Failed(_) => summary.failed += 1,
            }
        }

        if summary.scored > 0 {
            summary.mean = Some(total / summary.scored as f64);
        }
        summary
    }
}

/// Mean similarity per section for one model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSummary {
    pub model_id: String,
    /// Fully scored rows that contributed.
    pub rows: usize,
    pub means: BTreeMap<Section, f64>,
}

/// Average each similarity column per model.
///
/// Rows missing any of the five similarity values are left out, so every
/// model is averaged over the same set of rows in every section. Models
/// come back sorted by id.
pub fn summarize_by_model(table: &Table, model_column: &str) -> Result<Vec<ModelSummary>> {
    let similarity_columns: Vec<String> =
        Section::ALL.iter().map(|s| s.similarity_column()).collect();
    let mut required = vec![model_column.to_string()];
    required.extend(similarity_columns.iter().cloned());
    table.validate_columns(&required)?;

    let model_idx = table.column_index(model_column).unwrap_or_default();
    let score_idx: Vec<usize> = similarity_columns
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();

    let mut totals: BTreeMap<String, (usize, [f64; 5])> = BTreeMap::new();

    for row in 0..table.len() {
        let scores: Option<Vec<f64>> = score_idx
            .iter()
            .map(|&col| {
                table
                    .cell(row, col)
                    .filter(|v| !is_missing(v))
                    .and_then(|v| v.trim().parse::<f64>().ok())
            })
            .collect();

        let Some(scores) = scores else {
            continue;
        };

        let model = table.cell(row, model_idx).unwrap_or_default().to_string();
        let entry = totals.entry(model).or_insert((0, [0.0; 5]));
        entry.0 += 1;
        for (acc, score) in entry.1.iter_mut().zip(scores) {
            *acc += score;
        }
    }

    Ok(totals
        .into_iter()
        .map(|(model_id, (rows, sums))| ModelSummary {
            model_id,
            rows,
            means: Section::ALL
                .iter()
                .zip(sums)
                .map(|(section, sum)| (*section, sum / rows as f64))
                .collect(),
        })
        .collect())
}

/// Aggregated results of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub rows: usize,
    pub sections: Vec<SectionSummary>,
    /// Cells whose chunking or embedding failed.
    pub failures: usize,
    pub models: Vec<ModelSummary>,
    pub total_time_secs: f64,
}

impl EvaluationReport {
    /// Create an empty report.
    pub fn new(rows: usize) -> Self {
        Self {
            input_path: None,
            output_path: None,
            rows,
            sections: Vec::new(),
            failures: 0,
            models: Vec::new(),
            total_time_secs: 0.0,
        }
    }

    /// Recompute the failure total from the section summaries.
    pub fn calculate_failures(&mut self) {
        self.failures = self.sections.iter().map(|s| s.failed).sum();
    }

    /// Print summary to stdout.
    pub fn print_summary(&self) {
        println!("\n========== Similarity Evaluation ==========");
        if let Some(input) = &self.input_path {
            println!("Input:  {}", input.display());
        }
        println!("Rows:   {}", self.rows);
        println!("--------------------------------------------");
        println!(
            "{:<10} {:>7} {:>7} {:>7} {:>7} {:>8}",
            "section", "scored", "absent", "degen", "failed", "mean"
        );
        for s in &self.sections {
            println!(
                "{:<10} {:>7} {:>7} {:>7} {:>7} {:>8}",
                s.section.name(),
                s.scored,
                s.absent,
                s.degenerate,
                s.failed,
                s.mean.map_or("-".to_string(), |m| format!("{:.4}", m))
            );
        }
        if !self.models.is_empty() {
            println!("--------------------------------------------");
            print_model_table(&self.models);
        }
        println!("--------------------------------------------");
        println!("Failures:   {}", self.failures);
        println!("Total time: {:.1}s", self.total_time_secs);
        if let Some(output) = &self.output_path {
            println!("Output:     {}", output.display());
        }
        println!("============================================\n");
    }
}

/// Print per-model section means as a table.
pub fn print_model_table(models: &[ModelSummary]) {
    print!("{:<32} {:>5}", "model", "rows");
    for section in Section::ALL {
        print!(" {:>9}", section.name());
    }
    println!();
    for model in models {
        print!("{:<32} {:>5}", model.model_id, model.rows);
        for section in Section::ALL {
            match model.means.get(&section) {
                Some(mean) => print!(" {:>9.4}", mean),
                None => print!(" {:>9}", "-"),
            }
        }
        println!();
    }
}
