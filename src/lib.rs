//! Brief Similarity - section-wise semantic similarity for legal case briefs.
//!
//! Compares AI-generated case briefs with human-written references, one
//! section at a time (facts, issue, decision, reasons, ratio), and scores
//! each pair with the cosine similarity of sentence embeddings.
//!
//! # Overview
//!
//! Passages can be far longer than an embedding model's input window.
//! Instead of truncating, each passage is:
//! 1. Tokenized with the model's own tokenizer and cut into overlapping windows
//! 2. Embedded window by window, in fixed-size batches
//! 3. Mean-pooled into one document vector (re-normalized when enabled)
//!
//! Two pooled vectors are then compared with cosine similarity.
//!
//! # Quick Start
//!
//! ```no_run
//! use brief_similarity::{
//!     config::Config,
//!     driver::{BatchEvaluator, DriverOptions},
//!     embedding::CandleEmbedder,
//!     scorer::SimilarityScorer,
//! };
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     // Load the model once; the scorer owns it for the whole run
//!     let embedder = CandleEmbedder::load(&config.embedding)?;
//!     let scorer = SimilarityScorer::new(embedder, &config.embedding);
//!
//!     let score = scorer.score(Some("The appeal was allowed."), Some("Appeal allowed."))?;
//!     println!("{:?}", score);
//!
//!     let evaluator = BatchEvaluator::new(scorer, DriverOptions::from_config(&config.output));
//!     let report = evaluator.run(Path::new("case_model_results.csv"))?;
//!     report.print_summary();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **TokenChunker**: splits passages into tokenizer-bounded windows
//! - **Embed / Tokenize**: capability traits any embedding backend implements
//! - **CandleEmbedder**: local BERT-family sentence-transformer
//! - **SimilarityScorer**: chunk, embed, pool and compare two passages
//! - **BatchEvaluator**: scores a whole table and writes the augmented copy

pub mod chunker;
pub mod config;
pub mod driver;
pub mod embedding;
pub mod error;
pub mod persistence;
pub mod pooling;
pub mod report;
pub mod scorer;
pub mod table;

// Re-export commonly used types
pub use chunker::{ChunkPlan, TokenChunker};
pub use config::Config;
pub use driver::{BatchEvaluator, DriverOptions, EvaluatedTable, OUTPUT_FILENAME};
pub use embedding::{Embed, EmbeddingBatch, Tokenize};
pub use error::{EvalError, Result};
pub use report::{EvaluationReport, ModelSummary, SectionSummary};
pub use scorer::{CellOutcome, SimilarityScorer};
pub use table::{Section, Table};

#[cfg(feature = "candle")]
pub use embedding::CandleEmbedder;
