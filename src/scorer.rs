//! Long-text similarity: chunk, embed, pool, compare.

use crate::chunker::{ChunkPlan, TokenChunker};
use crate::config::EmbeddingConfig;
use crate::embedding::{Embed, embed_chunks};
use crate::error::Result;
use crate::pooling::{cosine_similarity, mean_pool};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Outcome of scoring one (row, section) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CellOutcome {
    /// Cosine similarity of the pooled vectors.
    Scored(f32),
    /// One side had no text.
    Absent,
    /// A pooled vector had zero norm.
    Degenerate,
    /// Chunking or embedding failed.
    Failed(String),
}

impl CellOutcome {
    /// The value written to the output table.
    pub fn value(&self) -> Option<f32> {
        match self {
            CellOutcome::Scored(score) => Some(*score),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CellOutcome::Failed(_))
    }
}

fn present(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.trim().is_empty())
}

/// Scores passage pairs with an injected embedding backend.
///
/// The backend is loaded once by the caller and only read here.
pub struct SimilarityScorer<E> {
    embedder: E,
    chunker: TokenChunker,
    batch_size: usize,
    normalize: bool,
    /// Pooled vectors keyed by passage text.
    cache: Option<RwLock<HashMap<String, Arc<Vec<f32>>>>>,
}

impl<E: Embed> SimilarityScorer<E> {
    /// Build a scorer whose window geometry follows the backend's limit.
    pub fn new(embedder: E, config: &EmbeddingConfig) -> Self {
        let model_max = embedder.max_input_tokens();
        let max_tokens = config
            .max_tokens
            .map_or(model_max, |requested| requested.min(model_max));
        let plan = ChunkPlan::for_model(max_tokens, config.chunk_overlap);

        Self {
            embedder,
            chunker: TokenChunker::new(plan, config.max_chunks),
            batch_size: config.batch_size.max(1),
            normalize: config.normalize_embeddings,
            cache: config
                .cache_embeddings
                .then(|| RwLock::new(HashMap::new())),
        }
    }

    /// Replace the derived chunker, e.g. to force a small window.
    pub fn with_chunker(mut self, chunker: TokenChunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn plan(&self) -> ChunkPlan {
        self.chunker.plan()
    }

    /// Split a passage the way scoring would.
    pub fn chunk(&self, text: &str) -> Result<Vec<String>> {
        self.chunker.chunk(&self.embedder, text)
    }

    /// One vector for a passage of any length, or `None` if it is blank.
    pub fn pooled_embedding(&self, text: &str) -> Result<Option<Arc<Vec<f32>>>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.read().ok().and_then(|c| c.get(text).cloned()) {
                return Ok(Some(hit));
            }
        }

        let chunks = self.chunk(text)?;
        if chunks.is_empty() {
            return Ok(None);
        }

        let batch = embed_chunks(&self.embedder, &chunks, self.batch_size, self.normalize)?;
        if batch.is_empty() {
            return Ok(None);
        }

        let pooled = Arc::new(mean_pool(batch.vectors(), self.normalize)?);

        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.write() {
                cache.insert(text.to_string(), Arc::clone(&pooled));
            }
        }

        Ok(Some(pooled))
    }

    /// Compare two passages, keeping absence and degeneracy distinct.
    pub fn compare(&self, a: Option<&str>, b: Option<&str>) -> Result<CellOutcome> {
        let (Some(a), Some(b)) = (present(a), present(b)) else {
            debug!("passage absent, no score");
            return Ok(CellOutcome::Absent);
        };

        let (Some(ea), Some(eb)) = (self.pooled_embedding(a)?, self.pooled_embedding(b)?) else {
            return Ok(CellOutcome::Absent);
        };

        match cosine_similarity(&ea, &eb)? {
            Some(score) => Ok(CellOutcome::Scored(score)),
            None => {
                debug!("zero-norm pooled vector, no score");
                Ok(CellOutcome::Degenerate)
            }
        }
    }

    /// Cosine similarity of two passages, `None` when either is missing.
    pub fn score(&self, a: Option<&str>, b: Option<&str>) -> Result<Option<f32>> {
        Ok(self.compare(a, b)?.value())
    }

    /// Like [`compare`](Self::compare) but folds errors into the outcome.
    pub fn evaluate(&self, a: Option<&str>, b: Option<&str>) -> CellOutcome {
        self.compare(a, b)
            .unwrap_or_else(|e| CellOutcome::Failed(e.to_string()))
    }

    /// Number of cached pooled vectors.
    pub fn cached_passages(&self) -> usize {
        self.cache
            .as_ref()
            .and_then(|c| c.read().ok().map(|c| c.len()))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::fake::{FAKE_DIMENSION, FakeEmbedder};
    use crate::error::EvalError;

    fn scorer(max_tokens: usize) -> SimilarityScorer<FakeEmbedder> {
        SimilarityScorer::new(FakeEmbedder::new(max_tokens), &EmbeddingConfig::default())
    }

    const LONG_A: &str = "The appellant was convicted of burglary after entering the premises at night \
        and removing several items of jewellery belonging to the respondent's family.";
    const LONG_B: &str = "The court held that the contract was void for uncertainty because \
        the essential terms regarding price and delivery had never been agreed between the parties.";

    #[test]
    fn test_plan_follows_model_limit() {
        let s = scorer(128);
        assert_eq!(s.plan().chunk_size(), 120);
        assert_eq!(s.plan().chunk_overlap(), 32);
    }

    #[test]
    fn test_configured_max_tokens_cannot_exceed_model() {
        let config = EmbeddingConfig {
            max_tokens: Some(4096),
            ..Default::default()
        };
        let s = SimilarityScorer::new(FakeEmbedder::new(128), &config);
        assert_eq!(s.plan().chunk_size(), 120);
    }

    #[test]
    fn test_null_propagation() {
        let s = scorer(64);
        assert_eq!(s.score(Some(""), Some("anything")).unwrap(), None);
        assert_eq!(s.score(None, Some("x")).unwrap(), None);
        assert_eq!(s.score(Some("   "), Some("x")).unwrap(), None);
        assert_eq!(s.score(Some("x"), None).unwrap(), None);
        assert_eq!(s.compare(Some("\n"), Some("x")).unwrap(), CellOutcome::Absent);
        assert_eq!(s.embedder().calls(), 0);
    }

    #[test]
    fn test_short_text_identity() {
        let s = scorer(512);
        let text = "The defendant owed a duty of care to the plaintiff.";
        let score = s.score(Some(text), Some(text)).unwrap().unwrap();
        assert!((score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_symmetry() {
        let s = scorer(40);
        let ab = s.score(Some(LONG_A), Some(LONG_B)).unwrap().unwrap();
        let ba = s.score(Some(LONG_B), Some(LONG_A)).unwrap().unwrap();
        assert_eq!(ab, ba);
        assert!((-1.0..=1.0).contains(&ab));
    }

    #[test]
    fn test_determinism_without_cache() {
        let config = EmbeddingConfig {
            cache_embeddings: false,
            ..Default::default()
        };
        let s = SimilarityScorer::new(FakeEmbedder::new(40), &config);
        let first = s.score(Some(LONG_A), Some(LONG_B)).unwrap();
        let second = s.score(Some(LONG_A), Some(LONG_B)).unwrap();
        assert_eq!(first, second);
        assert_eq!(s.cached_passages(), 0);
    }

    #[test]
    fn test_long_text_is_chunked_not_truncated() {
        let s = scorer(40);
        let chunks = s.chunk(LONG_A).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= s.plan().chunk_size()));
    }

    #[test]
    fn test_dimension_invariance() {
        let s = scorer(40);
        let one = s.pooled_embedding("short passage").unwrap().unwrap();
        let many = s.pooled_embedding(LONG_A).unwrap().unwrap();
        assert_eq!(s.chunk("short passage").unwrap().len(), 1);
        assert!(s.chunk(LONG_A).unwrap().len() > 1);
        assert_eq!(one.len(), FAKE_DIMENSION);
        assert_eq!(many.len(), FAKE_DIMENSION);
    }

    #[test]
    fn test_cache_reuses_pooled_vectors() {
        let s = scorer(512);
        s.score(Some("first passage"), Some("reference text")).unwrap();
        let calls = s.embedder().calls();
        s.score(Some("second passage"), Some("reference text")).unwrap();
        assert_eq!(s.embedder().calls(), calls + 1);
        assert_eq!(s.cached_passages(), 3);
    }

    #[test]
    fn test_cache_hits_only_for_identical_text() {
        let s = scorer(512);
        let first = s.pooled_embedding("the appeal is allowed").unwrap().unwrap();
        let other = s.pooled_embedding("the appeal is dismissed").unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_ne!(*first, *other);

        let again = s.pooled_embedding("the appeal is allowed").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(s.cached_passages(), 2);
    }

    #[test]
    fn test_degenerate_vector_is_not_a_score() {
        let s = SimilarityScorer::new(
            FakeEmbedder::new(512).zero_on("ZERO"),
            &EmbeddingConfig::default(),
        );
        let outcome = s.compare(Some("ZERO"), Some("text")).unwrap();
        assert_eq!(outcome, CellOutcome::Degenerate);
        assert_eq!(outcome.value(), None);
    }

    #[test]
    fn test_backend_failure_becomes_failed_outcome() {
        let s = SimilarityScorer::new(
            FakeEmbedder::new(512).failing_on("BOOM"),
            &EmbeddingConfig::default(),
        );
        assert!(matches!(
            s.score(Some("BOOM"), Some("text")),
            Err(EvalError::Embedding(_))
        ));
        let outcome = s.evaluate(Some("BOOM"), Some("text"));
        assert!(outcome.is_failure());
        assert_eq!(outcome.value(), None);
    }

    #[test]
    fn test_chunk_budget_failure() {
        let config = EmbeddingConfig {
            max_chunks: 1,
            ..Default::default()
        };
        let s = SimilarityScorer::new(FakeEmbedder::new(24), &config);
        let outcome = s.evaluate(Some(LONG_A), Some("x"));
        assert!(outcome.is_failure());
    }
}
