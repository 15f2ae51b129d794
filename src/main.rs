//! Brief Similarity CLI
//!
//! Scores AI-generated legal case briefs against human-written references.

use anyhow::{Context, Result};
use brief_similarity::{
    config::{Config, DeviceChoice},
    driver::{BatchEvaluator, DriverOptions},
    embedding::{CandleEmbedder, Tokenize},
    persistence::{load_table, save_report},
    report::{print_model_table, summarize_by_model},
    scorer::SimilarityScorer,
};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Brief Similarity - section-wise semantic similarity for case briefs
#[derive(Parser)]
#[command(name = "brief-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Embedding options shared by every command that loads a model.
#[derive(Args, Debug, Clone, Default)]
struct ModelArgs {
    /// Hugging Face model id
    #[arg(long)]
    model: Option<String>,

    /// Compute device (auto, cpu, cuda)
    #[arg(long)]
    device: Option<DeviceChoice>,

    /// Token overlap between consecutive chunks
    #[arg(long)]
    chunk_overlap: Option<usize>,

    /// Token window (defaults to the model's limit)
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Chunks encoded per forward pass
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum chunks per passage
    #[arg(long)]
    max_chunks: Option<usize>,

    /// Do not L2-normalize embeddings
    #[arg(long)]
    no_normalize: bool,

    /// Do not cache pooled vectors between rows
    #[arg(long)]
    no_cache: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every section of every row in a CSV table
    Evaluate {
        /// Input CSV with ai_<section> and human_<section> columns
        input: PathBuf,

        /// Directory for the evaluated table
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Only evaluate the first N rows
        #[arg(long)]
        max_rows: Option<usize>,

        /// Save the run report as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Hide progress bars
        #[arg(short, long)]
        quiet: bool,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Score two text files against each other
    Score {
        /// First passage
        first: PathBuf,

        /// Second passage
        second: PathBuf,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Show how a passage is split into chunks
    Chunks {
        /// Passage text file
        file: PathBuf,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Average similarity per model over an evaluated table
    Summarize {
        /// Evaluated CSV table
        input: PathBuf,

        /// Column holding the model identifier
        #[arg(long)]
        model_column: Option<String>,

        /// Output as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("brief_similarity=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            input,
            output_dir,
            max_rows,
            report,
            quiet,
            model,
        } => cmd_evaluate(input, output_dir, max_rows, report, quiet, model),
        Commands::Score {
            first,
            second,
            model,
        } => cmd_score(first, second, model),
        Commands::Chunks { file, model } => cmd_chunks(file, model),
        Commands::Summarize {
            input,
            model_column,
            json,
        } => cmd_summarize(input, model_column, json),
    }
}

/// Layer CLI flags over the loaded configuration and validate.
fn load_config(args: &ModelArgs) -> Result<Config> {
    let mut config = Config::load().context("Failed to load configuration")?;

    if let Some(model) = &args.model {
        config.embedding.model_id = model.clone();
    }
    if let Some(device) = args.device {
        config.embedding.device = device;
    }
    if let Some(overlap) = args.chunk_overlap {
        config.embedding.chunk_overlap = overlap;
    }
    if args.max_tokens.is_some() {
        config.embedding.max_tokens = args.max_tokens;
    }
    if let Some(batch_size) = args.batch_size {
        config.embedding.batch_size = batch_size;
    }
    if let Some(max_chunks) = args.max_chunks {
        config.embedding.max_chunks = max_chunks;
    }
    if args.no_normalize {
        config.embedding.normalize_embeddings = false;
    }
    if args.no_cache {
        config.embedding.cache_embeddings = false;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn load_scorer(config: &Config) -> Result<SimilarityScorer<CandleEmbedder>> {
    info!(model = %config.embedding.model_id, device = %config.embedding.device, "Loading embedding model");
    let embedder =
        CandleEmbedder::load(&config.embedding).context("Failed to load embedding model")?;
    Ok(SimilarityScorer::new(embedder, &config.embedding))
}

fn read_passage(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn cmd_evaluate(
    input: PathBuf,
    output_dir: Option<PathBuf>,
    max_rows: Option<usize>,
    report_path: Option<PathBuf>,
    quiet: bool,
    model: ModelArgs,
) -> Result<()> {
    let mut config = load_config(&model)?;
    if let Some(dir) = output_dir {
        config.output.dir = dir;
    }

    let scorer = load_scorer(&config)?;
    let plan = scorer.plan();
    println!("Model:  {}", config.embedding.model_id);
    println!(
        "Window: {} tokens, overlap {}, batch {}",
        plan.chunk_size(),
        plan.chunk_overlap(),
        config.embedding.batch_size
    );

    let mut options = DriverOptions::from_config(&config.output);
    options.max_rows = max_rows;
    options.show_progress = !quiet;

    let evaluator = BatchEvaluator::new(scorer, options);
    let report = evaluator
        .run(&input)
        .with_context(|| format!("Evaluation of {} failed", input.display()))?;

    report.print_summary();

    if let Some(path) = report_path {
        save_report(&report, &path).context("Failed to save report")?;
        println!("Report saved to {}", path.display());
    }

    println!("Evaluation complete. Results saved to {}", evaluator.output_path().display());
    Ok(())
}

fn cmd_score(first: PathBuf, second: PathBuf, model: ModelArgs) -> Result<()> {
    let config = load_config(&model)?;
    let a = read_passage(&first)?;
    let b = read_passage(&second)?;

    let scorer = load_scorer(&config)?;
    let start = Instant::now();
    let score = scorer
        .score(Some(&a), Some(&b))
        .context("Scoring failed")?;

    match score {
        Some(score) => println!("Similarity: {:.4}", score),
        None => println!("Similarity: n/a (empty passage or zero vector)"),
    }
    println!("Scored in {:.2?}", start.elapsed());
    Ok(())
}

fn cmd_chunks(file: PathBuf, model: ModelArgs) -> Result<()> {
    let config = load_config(&model)?;
    let text = read_passage(&file)?;

    let scorer = load_scorer(&config)?;
    let plan = scorer.plan();
    let total = scorer.embedder().encode_ids(&text)?.len();
    let chunks = scorer.chunk(&text).context("Chunking failed")?;

    println!("Passage: {} ({} tokens)", file.display(), total);
    println!(
        "Window:  {} tokens, overlap {}, stride {}",
        plan.chunk_size(),
        plan.chunk_overlap(),
        plan.stride()
    );
    println!("{}", "─".repeat(60));

    for (i, chunk) in chunks.iter().enumerate() {
        let tokens = scorer.embedder().encode_ids(chunk)?.len();
        let preview: String = chunk.chars().take(60).collect();
        println!("{:>3}. {:>4} tokens  {}", i + 1, tokens, preview.replace('\n', " "));
    }

    println!("{}", "─".repeat(60));
    println!("{} chunks", chunks.len());
    Ok(())
}

fn cmd_summarize(input: PathBuf, model_column: Option<String>, json: bool) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let column = model_column.unwrap_or(config.output.model_column);

    let table = load_table(&input).context("Failed to load evaluated table")?;
    let models = summarize_by_model(&table, &column).context("Failed to summarize table")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else if models.is_empty() {
        println!("No fully scored rows in {}", input.display());
    } else {
        print_model_table(&models);
    }

    Ok(())
}
