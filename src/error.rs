//! Error types for the similarity evaluator.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur while evaluating brief similarity.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error reading or writing a CSV table.
    #[error("CSV error: {0}")]
    Csv(String),

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The input table does not exist.
    #[error("Input table not found at '{0}'")]
    TableNotFound(PathBuf),

    /// Required columns are absent from the input table.
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The tokenizer failed to encode or decode.
    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    /// The embedding backend failed for a batch of chunks.
    #[error("Embedding backend failure: {0}")]
    Embedding(String),

    /// The embedding model could not be loaded.
    #[error("Failed to load embedding model '{model}': {reason}")]
    ModelLoad { model: String, reason: String },

    /// Pooling was asked to combine vectors it cannot combine.
    #[error("Invalid pooling input: {0}")]
    InvalidPooling(String),

    /// A passage would need more windows than the configured budget.
    #[error("Passage needs {chunks} chunks, budget is {max}")]
    ChunkBudgetExceeded { chunks: usize, max: usize },
}

impl EvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a model loading error.
    pub fn model_load(model: impl Into<String>, reason: impl ToString) -> Self {
        Self::ModelLoad {
            model: model.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<csv::Error> for EvalError {
    fn from(err: csv::Error) -> Self {
        EvalError::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::Serialization(err.to_string())
    }
}

#[cfg(feature = "candle")]
impl From<candle_core::Error> for EvalError {
    fn from(err: candle_core::Error) -> Self {
        EvalError::Embedding(err.to_string())
    }
}
