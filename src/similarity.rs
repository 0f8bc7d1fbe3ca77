//! Cosine similarity between recommendation fingerprints.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimilarityError {
    /// The vectors have different lengths.
    #[error("Dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// At least one vector has no components.
    #[error("Cannot compare an empty vector")]
    EmptyVector,
}

/// Outcome of comparing a score against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    Different,
    Similar,
}

/// Cosine similarity of two equal-length vectors, in `[-1, 1]`.
///
/// Accumulates in `f64` so that `similarity(a, a)` lands on `1.0` for the
/// 3072-dimensional vectors produced by hosted embedding models. A vector with
/// zero magnitude is orthogonal to everything and scores `0.0`.
pub fn similarity(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(SimilarityError::EmptyVector);
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    Ok(score.clamp(-1.0, 1.0) as f32)
}

/// `Similar` iff `score` is strictly above `threshold`.
pub fn classify(score: f32, threshold: f32) -> Similarity {
    if score > threshold {
        Similarity::Similar
    } else {
        Similarity::Different
    }
}
