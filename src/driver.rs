//! Batch evaluation over a table of AI/human brief pairs.

use crate::config::OutputConfig;
use crate::embedding::Embed;
use crate::error::Result;
use crate::persistence::{load_table, save_table};
use crate::report::{EvaluationReport, SectionSummary, summarize_by_model};
use crate::scorer::{CellOutcome, SimilarityScorer};
use crate::table::{Section, Table};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// File name of the evaluated table inside the output directory.
pub const OUTPUT_FILENAME: &str = "evaluated_case_model_results_with_section_similarity.csv";

/// Options for a batch run.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Directory the evaluated table is written to.
    pub output_dir: PathBuf,
    /// Column holding the model identifier.
    pub model_column: String,
    /// Column holding the case name.
    pub case_column: String,
    /// Only evaluate the first N rows.
    pub max_rows: Option<usize>,
    /// Draw a progress bar per section.
    pub show_progress: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::from_config(&OutputConfig::default())
    }
}

impl DriverOptions {
    pub fn from_config(output: &OutputConfig) -> Self {
        Self {
            output_dir: output.dir.clone(),
            model_column: output.model_column.clone(),
            case_column: output.case_column.clone(),
            max_rows: None,
            show_progress: true,
        }
    }
}

/// A table with similarity columns filled in, plus every cell outcome.
#[derive(Debug, Clone)]
pub struct EvaluatedTable {
    pub table: Table,
    /// `outcomes[row][i]` belongs to `Section::ALL[i]`.
    pub outcomes: Vec<Vec<CellOutcome>>,
}

impl EvaluatedTable {
    pub fn outcome(&self, row: usize, section: Section) -> Option<&CellOutcome> {
        let idx = Section::ALL.iter().position(|s| *s == section)?;
        self.outcomes.get(row)?.get(idx)
    }

    /// Cells whose chunking or embedding failed.
    pub fn failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .flatten()
            .filter(|o| o.is_failure())
            .count()
    }

    pub fn section_summaries(&self) -> Vec<SectionSummary> {
        Section::ALL
            .iter()
            .enumerate()
            .map(|(i, section)| {
                SectionSummary::from_outcomes(
                    *section,
                    self.outcomes.iter().filter_map(|row| row.get(i)),
                )
            })
            .collect()
    }
}

/// Scores every row and section of an input table.
pub struct BatchEvaluator<E> {
    scorer: SimilarityScorer<E>,
    options: DriverOptions,
}

impl<E: Embed> BatchEvaluator<E> {
    /// Create an evaluator around an already-loaded scorer.
    pub fn new(scorer: SimilarityScorer<E>, options: DriverOptions) -> Self {
        Self { scorer, options }
    }

    pub fn scorer(&self) -> &SimilarityScorer<E> {
        &self.scorer
    }

    /// Where [`run`](Self::run) writes the evaluated table.
    pub fn output_path(&self) -> PathBuf {
        self.options.output_dir.join(OUTPUT_FILENAME)
    }

    /// Validate, score and augment a table in memory.
    ///
    /// Missing input columns fail before any row is scored. Scoring
    /// failures are confined to their cell.
    pub fn evaluate_table(&self, mut table: Table) -> Result<EvaluatedTable> {
        let columns = table.passage_columns()?;

        if let Some(max) = self.options.max_rows {
            table.truncate(max);
        }

        let rows = table.len();
        let model_idx = table.column_index(&self.options.model_column);
        let case_idx = table.column_index(&self.options.case_column);
        let mut outcomes: Vec<Vec<CellOutcome>> =
            vec![Vec::with_capacity(Section::ALL.len()); rows];

        for (section, ai_idx, human_idx) in columns {
            let pb = self.progress_bar(rows, section);

            for (row, row_outcomes) in outcomes.iter_mut().enumerate() {
                let outcome = self
                    .scorer
                    .evaluate(table.passage(row, ai_idx), table.passage(row, human_idx));

                if let CellOutcome::Failed(reason) = &outcome {
                    warn!(
                        row,
                        section = section.name(),
                        model = model_idx.and_then(|i| table.cell(row, i)).unwrap_or("-"),
                        case = case_idx.and_then(|i| table.cell(row, i)).unwrap_or("-"),
                        error = %reason,
                        "Scoring failed, recording null"
                    );
                }

                row_outcomes.push(outcome);
                pb.inc(1);
            }

            pb.finish_and_clear();
            info!(section = section.name(), "Finished computing {}", section.similarity_column());
        }

        for (i, section) in Section::ALL.iter().enumerate() {
            let col = table.ensure_column(&section.similarity_column());
            for (row, row_outcomes) in outcomes.iter().enumerate() {
                let value = row_outcomes
                    .get(i)
                    .and_then(CellOutcome::value)
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                table.set_cell(row, col, value);
            }
        }

        Ok(EvaluatedTable { table, outcomes })
    }

    /// Evaluate the table at `input` and write the result to
    /// [`output_path`](Self::output_path).
    pub fn run(&self, input: &Path) -> Result<EvaluationReport> {
        let start_time = Instant::now();

        let table = load_table(input)?;
        info!(rows = table.len(), input = %input.display(), "Loaded input table");

        let evaluated = self.evaluate_table(table)?;

        let output_path = self.output_path();
        save_table(&evaluated.table, &output_path)?;

        let mut report = EvaluationReport::new(evaluated.table.len());
        report.input_path = Some(input.to_path_buf());
        report.output_path = Some(output_path.clone());
        report.sections = evaluated.section_summaries();
        report.calculate_failures();
        if evaluated.table.column_index(&self.options.model_column).is_some() {
            report.models = summarize_by_model(&evaluated.table, &self.options.model_column)?;
        }
        report.total_time_secs = start_time.elapsed().as_secs_f64();

        if report.failures > 0 {
            warn!(failures = report.failures, "Some cells could not be scored");
        }
        info!(output = %output_path.display(), "Evaluation complete");

        Ok(report)
    }

    fn progress_bar(&self, rows: usize, section: Section) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(rows as u64);
        let template = format!("  {:<9}[{{bar:30}}] {{pos}}/{{len}} ({{eta}})", section.name());
        if let Ok(style) = ProgressStyle::default_bar().template(&template) {
            pb.set_style(style);
        }
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{ChunkPlan, TokenChunker};
    use crate::config::EmbeddingConfig;
    use crate::embedding::fake::FakeEmbedder;
    use crate::error::EvalError;
    use crate::table::required_columns;
    use tempfile::TempDir;

    fn header() -> String {
        let mut cols = vec!["Model_ID".to_string(), "Case_Name".to_string()];
        cols.extend(required_columns());
        cols.join(",")
    }

    fn row(model: &str, case: &str, ai: [&str; 5], human: [&str; 5]) -> String {
        let mut cells = vec![model.to_string(), case.to_string()];
        for (a, h) in ai.iter().zip(human.iter()) {
            cells.push(a.to_string());
            cells.push(h.to_string());
        }
        cells.join(",")
    }

    fn sample_csv() -> String {
        let human = [
            "a snail in a bottle",
            "whether a duty is owed",
            "appeal allowed",
            "neighbour principle",
            "duty to neighbours",
        ];
        [
            header(),
            row(
                "vendor.model-a",
                "Donoghue",
                ["snail found in bottle", "is a duty owed", "allowed", "neighbours", "duty"],
                human,
            ),
            row(
                "vendor.model-b",
                "Donoghue",
                ["", "duty question", "BOOM dismissed", "reasons", "NaN"],
                human,
            ),
            row(
                "vendor.model-a",
                "Carlill",
                ["smoke ball", "offer to the world", "for plaintiff", "unilateral", "ads bind"],
                ["smoke ball", "unilateral offer", "for plaintiff", "acceptance", "offers bind"],
            ),
        ]
        .join("\n")
            + "\n"
    }

    fn evaluator(dir: &Path) -> BatchEvaluator<FakeEmbedder> {
        let scorer = SimilarityScorer::new(
            FakeEmbedder::new(512).failing_on("BOOM"),
            &EmbeddingConfig::default(),
        );
        let options = DriverOptions {
            output_dir: dir.to_path_buf(),
            show_progress: false,
            ..Default::default()
        };
        BatchEvaluator::new(scorer, options)
    }

    #[test]
    fn test_evaluate_table_adds_similarity_columns() {
        let dir = TempDir::new().unwrap();
        let ev = evaluator(dir.path());
        let table = Table::from_csv_str(&sample_csv()).unwrap();

        let evaluated = ev.evaluate_table(table).unwrap();
        let t = &evaluated.table;
        assert_eq!(t.len(), 3);
        for section in Section::ALL {
            assert!(t.column_index(&section.similarity_column()).is_some());
        }
        assert_eq!(t.headers().len(), 2 + 10 + 5);

        let facts = t.column_index("facts_similarity").unwrap();
        let score: f32 = t.cell(0, facts).unwrap().parse().unwrap();
        assert!((-1.0..=1.0).contains(&score));
    }

    #[test]
    fn test_batch_robustness_isolates_failing_cell() {
        let dir = TempDir::new().unwrap();
        let ev = evaluator(dir.path());
        let evaluated = ev
            .evaluate_table(Table::from_csv_str(&sample_csv()).unwrap())
            .unwrap();

        assert!(evaluated.outcome(1, Section::Decision).unwrap().is_failure());
        assert_eq!(evaluated.failure_count(), 1);

        let t = &evaluated.table;
        let decision = t.column_index("decision_similarity").unwrap();
        assert_eq!(t.cell(1, decision), Some(""));

        for row in [0, 2] {
            for section in Section::ALL {
                let outcome = evaluated.outcome(row, section).unwrap();
                assert!(matches!(outcome, CellOutcome::Scored(_)), "row {} {}", row, section);
            }
        }
        assert!(matches!(
            evaluated.outcome(1, Section::Issue),
            Some(CellOutcome::Scored(_))
        ));
        assert!(matches!(
            evaluated.outcome(1, Section::Reasons),
            Some(CellOutcome::Scored(_))
        ));
    }

    #[test]
    fn test_absent_passages_are_null_not_zero() {
        let dir = TempDir::new().unwrap();
        let ev = evaluator(dir.path());
        let evaluated = ev
            .evaluate_table(Table::from_csv_str(&sample_csv()).unwrap())
            .unwrap();

        assert_eq!(evaluated.outcome(1, Section::Facts), Some(&CellOutcome::Absent));
        assert_eq!(evaluated.outcome(1, Section::Ratio), Some(&CellOutcome::Absent));
        let ratio = evaluated.table.column_index("ratio_similarity").unwrap();
        assert_eq!(evaluated.table.cell(1, ratio), Some(""));
    }

    #[test]
    fn test_reordered_columns_pair_by_name() {
        let dir = TempDir::new().unwrap();
        let ev = evaluator(dir.path());

        let mut cols = required_columns();
        cols.reverse();
        let mut cells = vec![""; cols.len()];
        let ai = cols.iter().position(|c| c == "ai_facts").unwrap();
        let human = cols.iter().position(|c| c == "human_facts").unwrap();
        cells[ai] = "the neighbour principle";
        cells[human] = "the neighbour principle";
        let csv = format!("{}\n{}\n", cols.join(","), cells.join(","));

        let evaluated = ev.evaluate_table(Table::from_csv_str(&csv).unwrap()).unwrap();
        match evaluated.outcome(0, Section::Facts) {
            Some(CellOutcome::Scored(score)) => assert!((score - 1.0).abs() < 1e-5),
            other => panic!("expected a score, got {:?}", other),
        }
        assert_eq!(evaluated.outcome(0, Section::Ratio), Some(&CellOutcome::Absent));
    }

    #[test]
    fn test_schema_validation_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let out_dir = dir.path().join("results");
        let ev = evaluator(&out_dir);

        let input = dir.path().join("input.csv");
        let csv = sample_csv().replace("human_reasons", "human_reasoning");
        std::fs::write(&input, csv).unwrap();

        match ev.run(&input) {
            Err(EvalError::MissingColumns(missing)) => {
                assert_eq!(missing, vec!["human_reasons".to_string()]);
            }
            other => panic!("expected MissingColumns, got {:?}", other.map(|r| r.rows)),
        }
        assert!(!ev.output_path().exists());
        assert!(!out_dir.exists());
    }

    #[test]
    fn test_run_writes_output_and_report() {
        let dir = TempDir::new().unwrap();
        let out_dir = dir.path().join("results");
        let ev = evaluator(&out_dir);

        let input = dir.path().join("input.csv");
        std::fs::write(&input, sample_csv()).unwrap();

        let report = ev.run(&input).unwrap();
        let output = out_dir.join(OUTPUT_FILENAME);
        assert_eq!(report.output_path.as_deref(), Some(output.as_path()));
        assert!(output.exists());
        assert_eq!(report.rows, 3);
        assert_eq!(report.failures, 1);
        assert_eq!(report.sections.len(), 5);
        assert_eq!(report.sections[0].absent, 1);

        // model-b's only row has nulls, so only model-a is summarized
        assert_eq!(report.models.len(), 1);
        assert_eq!(report.models[0].model_id, "vendor.model-a");
        assert_eq!(report.models[0].rows, 2);

        let written = load_table(&output).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(written.headers()[..12], Table::from_csv_str(&sample_csv()).unwrap().headers()[..]);
    }

    #[test]
    fn test_existing_similarity_column_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let ev = evaluator(dir.path());
        let mut table = Table::from_csv_str(&sample_csv()).unwrap();
        let stale = table.ensure_column("facts_similarity");
        table.set_cell(1, stale, "0.99".to_string());

        let evaluated = ev.evaluate_table(table).unwrap();
        let t = &evaluated.table;
        assert_eq!(t.headers().iter().filter(|h| *h == "facts_similarity").count(), 1);
        assert_eq!(t.cell(1, stale), Some(""));
    }

    #[test]
    fn test_max_rows_limits_output() {
        let dir = TempDir::new().unwrap();
        let mut ev = evaluator(dir.path());
        ev.options.max_rows = Some(1);
        let evaluated = ev
            .evaluate_table(Table::from_csv_str(&sample_csv()).unwrap())
            .unwrap();
        assert_eq!(evaluated.table.len(), 1);
        assert_eq!(evaluated.outcomes.len(), 1);
    }

    #[test]
    fn test_long_passages_are_scored_through_chunks() {
        let dir = TempDir::new().unwrap();
        let long = "the court considered the statutory scheme at length ".repeat(20);
        let l = long.as_str();
        let csv = [
            header(),
            row("m", "c", [l, l, l, l, l], [l, "x", "y", "z", "w"]),
        ]
        .join("\n");

        let scorer = SimilarityScorer::new(FakeEmbedder::new(512), &EmbeddingConfig::default())
            .with_chunker(TokenChunker::new(ChunkPlan::new(64, 16).unwrap(), 512));
        let ev = BatchEvaluator::new(
            scorer,
            DriverOptions {
                output_dir: dir.path().to_path_buf(),
                show_progress: false,
                ..Default::default()
            },
        );
        assert!(ev.scorer().chunk(&long).unwrap().len() > 1);

        let evaluated = ev.evaluate_table(Table::from_csv_str(&csv).unwrap()).unwrap();
        match evaluated.outcome(0, Section::Facts) {
            Some(CellOutcome::Scored(score)) => assert!((score - 1.0).abs() < 1e-5),
            other => panic!("expected a score, got {:?}", other),
        }
    }
}
