//! Embedding backends and the capability interface the pipeline relies on.
//!
//! The chunker only needs [`Tokenize`]; the scorer needs [`Embed`]. Any
//! backend exposing both (a local candle model, or a fake in tests) can be
//! plugged into [`crate::scorer::SimilarityScorer`].

#[cfg(feature = "candle")]
pub mod candle;

#[cfg(test)]
pub(crate) mod fake;

#[cfg(feature = "candle")]
pub use candle::CandleEmbedder;

use crate::error::{EvalError, Result};
use crate::pooling::l2_normalize;
use tracing::debug;

/// Tokenizer capability of an embedding model.
pub trait Tokenize {
    /// Encode text to token ids without special/boundary tokens.
    fn encode_ids(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode token ids back to text, skipping special tokens.
    fn decode_ids(&self, ids: &[u32]) -> Result<String>;

    /// Maximum number of tokens the model accepts in one input.
    fn max_input_tokens(&self) -> usize;
}

/// A model that maps text to fixed-dimension vectors.
pub trait Embed: Tokenize {
    /// Native output dimension.
    fn dimension(&self) -> usize;

    /// Encode a batch of texts, one raw vector per text, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Chunk vectors for one passage, tagged with the backend dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingBatch {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingBatch {
    /// An empty batch that still knows its dimension.
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}

/// Embed chunks in fixed-size batches, preserving chunk order.
///
/// When `normalize` is set every chunk vector is scaled to unit L2 norm
/// right after encoding. The backend must return exactly one vector of
/// its native dimension per chunk.
pub fn embed_chunks<E: Embed + ?Sized>(
    backend: &E,
    chunks: &[String],
    batch_size: usize,
    normalize: bool,
) -> Result<EmbeddingBatch> {
    let dimension = backend.dimension();
    if chunks.is_empty() {
        return Ok(EmbeddingBatch::empty(dimension));
    }
    if batch_size == 0 {
        return Err(EvalError::InvalidConfig(
            "batch_size must be at least 1".to_string(),
        ));
    }

    let mut vectors = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<&str> = batch.iter().map(|c| c.as_str()).collect();
        let embeddings = backend.embed_batch(&texts)?;

        if embeddings.len() != texts.len() {
            return Err(EvalError::Embedding(format!(
                "backend returned {} vectors for {} chunks",
                embeddings.len(),
                texts.len()
            )));
        }

        for mut embedding in embeddings {
            if embedding.len() != dimension {
                return Err(EvalError::Embedding(format!(
                    "backend returned a {}-dim vector, expected {}",
                    embedding.len(),
                    dimension
                )));
            }
            if normalize {
                l2_normalize(&mut embedding);
            }
            vectors.push(embedding);
        }
    }

    debug!(chunks = chunks.len(), dimension, "embedded chunks");

    Ok(EmbeddingBatch { dimension, vectors })
}
