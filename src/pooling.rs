//! Vector math: L2 normalization, mean pooling and cosine similarity.

use crate::error::{EvalError, Result};

/// Euclidean norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Element-wise mean of same-dimension vectors.
///
/// When `normalize` is set the mean is rescaled to unit length, since the
/// mean of unit vectors generally is not. Callers must not pass an empty
/// set; a passage without chunks has no embedding.
pub fn mean_pool(vectors: &[Vec<f32>], normalize: bool) -> Result<Vec<f32>> {
    let first = vectors.first().ok_or_else(|| {
        EvalError::InvalidPooling("cannot pool an empty set of vectors".to_string())
    })?;
    let dimension = first.len();

    let mut pooled = vec![0.0f32; dimension];
    for vector in vectors {
        if vector.len() != dimension {
            return Err(EvalError::InvalidPooling(format!(
                "dimension mismatch: {} vs {}",
                vector.len(),
                dimension
            )));
        }
        for (acc, x) in pooled.iter_mut().zip(vector) {
            *acc += x;
        }
    }

    let count = vectors.len() as f32;
    for x in pooled.iter_mut() {
        *x /= count;
    }

    if normalize {
        l2_normalize(&mut pooled);
    }

    Ok(pooled)
}

/// Cosine similarity between two vectors, clamped to `[-1, 1]`.
///
/// Returns `None` if either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<Option<f32>> {
    if a.len() != b.len() {
        return Err(EvalError::InvalidPooling(format!(
            "cannot compare {}-dim and {}-dim vectors",
            a.len(),
            b.len()
        )));
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(None);
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    Ok(Some((dot / (norm_a * norm_b)).clamp(-1.0, 1.0)))
}
