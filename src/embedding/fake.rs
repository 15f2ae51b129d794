//! Deterministic in-process backend for tests.
//!
//! Tokens are bytes, so an ASCII string of `n` characters is exactly `n`
//! tokens. Vectors are byte histograms folded into [`FAKE_DIMENSION`] bins.

use super::{Embed, Tokenize};
use crate::error::{EvalError, Result};
use std::sync::Mutex;

pub(crate) const FAKE_DIMENSION: usize = 16;

pub(crate) struct FakeEmbedder {
    max_input_tokens: usize,
    fail_marker: Option<String>,
    zero_marker: Option<String>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl FakeEmbedder {
    pub(crate) fn new(max_input_tokens: usize) -> Self {
        Self {
            max_input_tokens,
            fail_marker: None,
            zero_marker: None,
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Fail any batch containing a text with `marker`.
    pub(crate) fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    /// Return an all-zero vector for texts containing `marker`.
    pub(crate) fn zero_on(mut self, marker: &str) -> Self {
        self.zero_marker = Some(marker.to_string());
        self
    }

    /// Sizes of every batch passed to `embed_batch`, in call order.
    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .map(|sizes| sizes.clone())
            .unwrap_or_default()
    }

    pub(crate) fn calls(&self) -> usize {
        self.batch_sizes().len()
    }
}

impl Tokenize for FakeEmbedder {
    fn encode_ids(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.bytes().map(u32::from).collect())
    }

    fn decode_ids(&self, ids: &[u32]) -> Result<String> {
        let bytes = ids
            .iter()
            .map(|&id| {
                u8::try_from(id).map_err(|_| EvalError::Tokenization(format!("bad id {}", id)))
            })
            .collect::<Result<Vec<u8>>>()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }
}

impl Embed for FakeEmbedder {
    fn dimension(&self) -> usize {
        FAKE_DIMENSION
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if let Ok(mut sizes) = self.batch_sizes.lock() {
            sizes.push(texts.len());
        }

        if let Some(marker) = &self.fail_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(EvalError::Embedding("injected failure".to_string()));
            }
        }

        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; FAKE_DIMENSION];
                let zeroed = self
                    .zero_marker
                    .as_deref()
                    .is_some_and(|marker| text.contains(marker));
                if !zeroed {
                    for byte in text.bytes() {
                        vector[byte as usize % FAKE_DIMENSION] += 1.0;
                    }
                }
                vector
            })
            .collect())
    }
}
