//! Tokenizer-bounded chunking of long passages.
//!
//! A passage longer than the model window is tokenized once, cut into
//! windows of `chunk_size` tokens that advance by `stride = chunk_size -
//! chunk_overlap`, and each window is decoded back to text. A passage that
//! already fits is returned untouched.

use crate::embedding::Tokenize;
use crate::error::{EvalError, Result};
use std::ops::Range;

/// Tokens reserved for boundary tokens the model inserts itself.
pub const SPECIAL_TOKEN_MARGIN: usize = 8;

/// Smallest window the plan will derive from a model limit.
pub const MIN_CHUNK_SIZE: usize = 16;

/// Window geometry for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkPlan {
    /// Explicit geometry; requires `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(EvalError::InvalidConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(EvalError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Derive geometry from a model's input limit and a requested overlap.
    ///
    /// The window leaves [`SPECIAL_TOKEN_MARGIN`] tokens free, never drops
    /// below [`MIN_CHUNK_SIZE`], and overlap is clamped to half the window.
    pub fn for_model(max_input_tokens: usize, requested_overlap: usize) -> Self {
        let chunk_size = max_input_tokens
            .saturating_sub(SPECIAL_TOKEN_MARGIN)
            .max(MIN_CHUNK_SIZE);
        let chunk_overlap = requested_overlap.min(chunk_size / 2);
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Number of windows a passage of `n_tokens` produces.
    pub fn window_count(&self, n_tokens: usize) -> usize {
        if n_tokens == 0 {
            0
        } else if n_tokens <= self.chunk_size {
            1
        } else {
            (n_tokens - self.chunk_size).div_ceil(self.stride()) + 1
        }
    }

    /// Token ranges of every window over a sequence of `n_tokens`.
    ///
    /// The last range is clipped to the sequence end; no empty range is
    /// produced.
    pub fn windows(&self, n_tokens: usize) -> Vec<Range<usize>> {
        let mut windows = Vec::with_capacity(self.window_count(n_tokens));
        let mut start = 0;

        while start < n_tokens {
            let end = (start + self.chunk_size).min(n_tokens);
            windows.push(start..end);
            if end >= n_tokens {
                break;
            }
            start += self.stride();
        }

        windows
    }
}

/// Splits passages into overlapping windows under a token budget.
#[derive(Debug, Clone)]
pub struct TokenChunker {
    plan: ChunkPlan,
    max_chunks: usize,
}

impl TokenChunker {
    pub fn new(plan: ChunkPlan, max_chunks: usize) -> Self {
        Self { plan, max_chunks }
    }

    pub fn plan(&self) -> ChunkPlan {
        self.plan
    }

    /// Chunk `text` using `tokenizer`.
    ///
    /// Blank text yields no chunks. Text within one window comes back
    /// unmodified as a single chunk. Exceeding the chunk budget is an error.
    pub fn chunk<T: Tokenize + ?Sized>(&self, tokenizer: &T, text: &str) -> Result<Vec<String>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let ids = tokenizer.encode_ids(text)?;
        if ids.len() <= self.plan.chunk_size {
            return Ok(vec![text.to_string()]);
        }

        let count = self.plan.window_count(ids.len());
        if count > self.max_chunks {
            return Err(EvalError::ChunkBudgetExceeded {
                chunks: count,
                max: self.max_chunks,
            });
        }

        self.plan
            .windows(ids.len())
            .into_iter()
            .map(|range| tokenizer.decode_ids(&ids[range]))
            .collect()
    }
}
