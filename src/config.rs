//! Configuration for the similarity evaluator.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values,
//! and command-line flags take precedence over both.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Compute device for the embedding model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceChoice {
    /// CUDA if available, otherwise CPU.
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl FromStr for DeviceChoice {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(DeviceChoice::Auto),
            "cpu" => Ok(DeviceChoice::Cpu),
            "cuda" | "gpu" => Ok(DeviceChoice::Cuda),
            other => Err(EvalError::InvalidConfig(format!(
                "unknown device '{}', expected auto, cpu or cuda",
                other
            ))),
        }
    }
}

impl fmt::Display for DeviceChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceChoice::Auto => write!(f, "auto"),
            DeviceChoice::Cpu => write!(f, "cpu"),
            DeviceChoice::Cuda => write!(f, "cuda"),
        }
    }
}

/// Embedding pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Hugging Face model id (BERT-family sentence-transformer).
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Compute device.
    #[serde(default)]
    pub device: DeviceChoice,

    /// L2-normalize chunk embeddings and pooled vectors.
    #[serde(default = "default_normalize")]
    pub normalize_embeddings: bool,

    /// Requested token overlap between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Token window override; `None` uses the model's own limit.
    #[serde(default)]
    pub max_tokens: Option<usize>,

    /// Chunks encoded per forward pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum chunks a single passage may produce.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,

    /// Memoize pooled vectors by passage text.
    #[serde(default = "default_cache_embeddings")]
    pub cache_embeddings: bool,
}

fn default_model_id() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_normalize() -> bool {
    true
}

fn default_chunk_overlap() -> usize {
    32
}

fn default_batch_size() -> usize {
    32
}

fn default_max_chunks() -> usize {
    512
}

fn default_cache_embeddings() -> bool {
    true
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            device: DeviceChoice::Auto,
            normalize_embeddings: default_normalize(),
            chunk_overlap: default_chunk_overlap(),
            max_tokens: None,
            batch_size: default_batch_size(),
            max_chunks: default_max_chunks(),
            cache_embeddings: default_cache_embeddings(),
        }
    }
}

/// Output table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory the evaluated table is written to.
    pub dir: PathBuf,

    /// Column holding the model identifier.
    pub model_column: String,

    /// Column holding the case name.
    pub case_column: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            model_column: "Model_ID".to_string(),
            case_column: "Case_Name".to_string(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Embedding settings
    pub embedding: EmbeddingConfig,
    /// Output settings
    pub output: OutputConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    embedding: Option<EmbeddingFileSection>,
    output: Option<OutputFileSection>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingFileSection {
    model_id: Option<String>,
    device: Option<DeviceChoice>,
    normalize_embeddings: Option<bool>,
    chunk_overlap: Option<usize>,
    max_tokens: Option<usize>,
    batch_size: Option<usize>,
    max_chunks: Option<usize>,
    cache_embeddings: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct OutputFileSection {
    dir: Option<PathBuf>,
    model_column: Option<String>,
    case_column: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (BRIEF_EVAL_MODEL, BRIEF_EVAL_DEVICE, ...)
    /// 2. Config file (~/.config/brief-eval/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, filling gaps with defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| EvalError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(emb) = file_config.embedding {
            if let Some(model_id) = emb.model_id {
                config.embedding.model_id = model_id;
            }
            if let Some(device) = emb.device {
                config.embedding.device = device;
            }
            if let Some(normalize) = emb.normalize_embeddings {
                config.embedding.normalize_embeddings = normalize;
            }
            if let Some(overlap) = emb.chunk_overlap {
                config.embedding.chunk_overlap = overlap;
            }
            if emb.max_tokens.is_some() {
                config.embedding.max_tokens = emb.max_tokens;
            }
            if let Some(batch_size) = emb.batch_size {
                config.embedding.batch_size = batch_size;
            }
            if let Some(max_chunks) = emb.max_chunks {
                config.embedding.max_chunks = max_chunks;
            }
            if let Some(cache) = emb.cache_embeddings {
                config.embedding.cache_embeddings = cache;
            }
        }

        if let Some(output) = file_config.output {
            if let Some(dir) = output.dir {
                config.output.dir = dir;
            }
            if let Some(model_column) = output.model_column {
                config.output.model_column = model_column;
            }
            if let Some(case_column) = output.case_column {
                config.output.case_column = case_column;
            }
        }

        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| env::var(name).ok())
    }

    /// Apply `BRIEF_EVAL_*` overrides; unparsable values are errors.
    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(model) = lookup("BRIEF_EVAL_MODEL") {
            self.embedding.model_id = model;
        }
        if let Some(device) = parse_var(&lookup, "BRIEF_EVAL_DEVICE")? {
            self.embedding.device = device;
        }
        if let Some(normalize) = parse_var(&lookup, "BRIEF_EVAL_NORMALIZE")? {
            self.embedding.normalize_embeddings = normalize;
        }
        if let Some(overlap) = parse_var(&lookup, "BRIEF_EVAL_CHUNK_OVERLAP")? {
            self.embedding.chunk_overlap = overlap;
        }
        if let Some(max_tokens) = parse_var(&lookup, "BRIEF_EVAL_MAX_TOKENS")? {
            self.embedding.max_tokens = Some(max_tokens);
        }
        if let Some(batch_size) = parse_var(&lookup, "BRIEF_EVAL_BATCH_SIZE")? {
            self.embedding.batch_size = batch_size;
        }
        if let Some(max_chunks) = parse_var(&lookup, "BRIEF_EVAL_MAX_CHUNKS")? {
            self.embedding.max_chunks = max_chunks;
        }
        if let Some(dir) = lookup("BRIEF_EVAL_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }

        Ok(())
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "brief-eval")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate the configuration before any model is loaded.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.model_id.trim().is_empty() {
            return Err(EvalError::Config(
                "Embedding model id is required. Set BRIEF_EVAL_MODEL or add to config file."
                    .to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(EvalError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }

        if self.embedding.max_tokens == Some(0) {
            return Err(EvalError::InvalidConfig(
                "max_tokens must be at least 1".to_string(),
            ));
        }

        if self.embedding.max_chunks == 0 {
            return Err(EvalError::InvalidConfig(
                "max_chunks must be at least 1".to_string(),
            ));
        }

        if self.output.dir.as_os_str().is_empty() {
            return Err(EvalError::InvalidConfig(
                "output directory must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T: FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    match lookup(name) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            EvalError::InvalidConfig(format!("{} has an invalid value '{}'", name, raw))
        }),
        None => Ok(None),
    }
}
