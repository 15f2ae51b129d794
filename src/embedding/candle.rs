//! Local embedding model using candle + sentence-transformers.

use super::{Embed, Tokenize};
use crate::config::{DeviceChoice, EmbeddingConfig};
use crate::error::{EvalError, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

/// Fields of `config.json` the pipeline needs beyond what BERT loading uses.
#[derive(Debug, Deserialize)]
struct ModelShape {
    hidden_size: usize,
    max_position_embeddings: usize,
}

/// `sentence_bert_config.json`, shipped by sentence-transformers repos.
#[derive(Debug, Deserialize)]
struct SentenceBertConfig {
    max_seq_length: Option<usize>,
}

/// BERT-family sentence embedder, loaded once and shared read-only.
pub struct CandleEmbedder {
    model: BertModel,
    /// Untruncated; used for chunking whole passages.
    chunk_tokenizer: Tokenizer,
    /// Truncates to the model's window; used for forward passes.
    model_tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
    max_input_tokens: usize,
}

impl CandleEmbedder {
    /// Load the model named in `config` from the Hugging Face Hub.
    pub fn load(config: &EmbeddingConfig) -> Result<Self> {
        let model_id = config.model_id.as_str();
        let device = select_device(config.device)?;

        let api = Api::new().map_err(|e| EvalError::model_load(model_id, e))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        // Download model files
        let config_path = repo
            .get("config.json")
            .map_err(|e| EvalError::model_load(model_id, format!("config.json: {}", e)))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| EvalError::model_load(model_id, format!("tokenizer.json: {}", e)))?;
        let weights = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))
            .map(WeightsFile::from_path)
            .map_err(|e| EvalError::model_load(model_id, format!("weights: {}", e)))?;

        let config_text = std::fs::read_to_string(&config_path)
            .map_err(|e| EvalError::io(&config_path, e))?;
        let bert_config: BertConfig = serde_json::from_str(&config_text)
            .map_err(|e| EvalError::model_load(model_id, format!("config.json: {}", e)))?;
        let shape: ModelShape = serde_json::from_str(&config_text)
            .map_err(|e| EvalError::model_load(model_id, format!("config.json: {}", e)))?;

        // Optional; absent for plain BERT checkpoints.
        let sbert_max = repo
            .get("sentence_bert_config.json")
            .ok()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|text| serde_json::from_str::<SentenceBertConfig>(&text).ok())
            .and_then(|c| c.max_seq_length);

        let max_input_tokens = resolve_max_input_tokens(
            config.max_tokens,
            sbert_max,
            shape.max_position_embeddings,
        );

        let chunk_tokenizer = Tokenizer::from_file(&tokenizer_path)
            .and_then(chunking_tokenizer)
            .map_err(|e| EvalError::model_load(model_id, format!("tokenizer: {}", e)))?;

        let mut model_tokenizer = chunk_tokenizer.clone();
        model_tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: shape.max_position_embeddings,
                ..Default::default()
            }))
            .map_err(|e| EvalError::model_load(model_id, format!("tokenizer: {}", e)))?;

        let vb = weights
            .var_builder(&device)
            .map_err(|e| EvalError::model_load(model_id, e))?;

        let model =
            BertModel::load(vb, &bert_config).map_err(|e| EvalError::model_load(model_id, e))?;

        info!(
            model = model_id,
            device = ?device,
            dimension = shape.hidden_size,
            max_input_tokens,
            weights = %weights.path().display(),
            "loaded embedding model"
        );

        Ok(Self {
            model,
            chunk_tokenizer,
            model_tokenizer,
            device,
            dimension: shape.hidden_size,
            max_input_tokens,
        })
    }
}

/// Window the model accepts: a configured limit wins, then the
/// sentence-transformers `max_seq_length`, never past the position table.
fn resolve_max_input_tokens(
    configured: Option<usize>,
    sbert: Option<usize>,
    max_position: usize,
) -> usize {
    configured
        .or(sbert)
        .unwrap_or(max_position)
        .min(max_position)
}

/// Strip padding and truncation so whole passages tokenize in full.
fn chunking_tokenizer(mut tokenizer: Tokenizer) -> tokenizers::Result<Tokenizer> {
    tokenizer.with_padding(None);
    tokenizer.with_truncation(None)?;
    Ok(tokenizer)
}

/// Token ids without `[CLS]`/`[SEP]`.
fn encode_plain(tokenizer: &Tokenizer, text: &str) -> Result<Vec<u32>> {
    let encoding = tokenizer
        .encode(text, false)
        .map_err(|e| EvalError::Tokenization(e.to_string()))?;
    Ok(encoding.get_ids().to_vec())
}

fn decode_plain(tokenizer: &Tokenizer, ids: &[u32]) -> Result<String> {
    tokenizer
        .decode(ids, true)
        .map_err(|e| EvalError::Tokenization(e.to_string()))
}

/// Downloaded weights, by serialization format.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WeightsFile {
    Safetensors(PathBuf),
    /// PyTorch pickle (`pytorch_model.bin`).
    Pytorch(PathBuf),
}

impl WeightsFile {
    fn from_path(path: PathBuf) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("safetensors") => WeightsFile::Safetensors(path),
            _ => WeightsFile::Pytorch(path),
        }
    }

    fn path(&self) -> &Path {
        match self {
            WeightsFile::Safetensors(path) | WeightsFile::Pytorch(path) => path,
        }
    }

    fn var_builder(&self, device: &Device) -> candle_core::Result<VarBuilder<'static>> {
        match self {
            // SAFETY: the file is not modified while the model is alive.
            WeightsFile::Safetensors(path) => unsafe {
                VarBuilder::from_mmaped_safetensors(&[path], DTYPE, device)
            },
            WeightsFile::Pytorch(path) => VarBuilder::from_pth(path, DTYPE, device),
        }
    }
}

fn select_device(choice: DeviceChoice) -> Result<Device> {
    match choice {
        DeviceChoice::Cpu => Ok(Device::Cpu),
        DeviceChoice::Cuda => Device::new_cuda(0)
            .map_err(|e| EvalError::InvalidConfig(format!("CUDA device unavailable: {}", e))),
        DeviceChoice::Auto => Device::cuda_if_available(0)
            .map_err(|e| EvalError::InvalidConfig(format!("device selection failed: {}", e))),
    }
}

impl Tokenize for CandleEmbedder {
    fn encode_ids(&self, text: &str) -> Result<Vec<u32>> {
        encode_plain(&self.chunk_tokenizer, text)
    }

    fn decode_ids(&self, ids: &[u32]) -> Result<String> {
        decode_plain(&self.chunk_tokenizer, ids)
    }

    fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }
}

impl Embed for CandleEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .model_tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EvalError::Tokenization(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids_vec = Vec::with_capacity(texts.len() * max_len);
        let mut attention_mask_vec = Vec::with_capacity(texts.len() * max_len);

        for encoding in &encodings {
            let mut padded_ids = encoding.get_ids().to_vec();
            let mut padded_mask = encoding.get_attention_mask().to_vec();
            padded_ids.resize(max_len, 0);
            padded_mask.resize(max_len, 0);
            input_ids_vec.extend(padded_ids);
            attention_mask_vec.extend(padded_mask);
        }

        let batch_size = texts.len();
        let token_type_ids_vec = vec![0u32; batch_size * max_len];

        let input_ids = Tensor::from_vec(input_ids_vec, (batch_size, max_len), &self.device)?;
        let attention_mask =
            Tensor::from_vec(attention_mask_vec, (batch_size, max_len), &self.device)?;
        let token_type_ids =
            Tensor::from_vec(token_type_ids_vec, (batch_size, max_len), &self.device)?;

        let output = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // Mean pooling over sequence dimension (with attention mask)
        let attention_mask_expanded = attention_mask
            .unsqueeze(2)?
            .to_dtype(output.dtype())?
            .broadcast_as(output.shape())?;

        let sum_embeddings = (output * &attention_mask_expanded)?.sum(1)?;
        let sum_mask = attention_mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;
        let mean_embeddings = (sum_embeddings / sum_mask)?;

        let vectors = mean_embeddings.to_vec2::<f32>()?;
        debug!(batch = batch_size, tokens = max_len, "encoded batch");
        Ok(vectors)
    }
}
