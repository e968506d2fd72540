//! Element-wise averaging of sample embeddings.

use crate::types::{Centroid, FlowerError, FlowerResult};

/// Average a category's sample embeddings into a centroid.
///
/// All embeddings must be non-empty, finite, and of equal length. Sums are
/// accumulated in `f64`, so the result does not depend on sample order beyond
/// rounding of the final `f32` cast.
pub fn mean_embedding(embeddings: &[Vec<f32>]) -> FlowerResult<Centroid> {
    let first = embeddings
        .first()
        .ok_or_else(|| FlowerError::InvalidInput("cannot average zero embeddings".to_string()))?;
    let dim = first.len();
    if dim == 0 {
        return Err(FlowerError::InvalidEmbedding("embedding is empty".to_string()));
    }

    let mut sums = vec![0.0f64; dim];
    for embedding in embeddings {
        if embedding.len() != dim {
            return Err(FlowerError::DimensionMismatch {
                expected: dim,
                actual: embedding.len(),
            });
        }
        for (sum, &v) in sums.iter_mut().zip(embedding.iter()) {
            if !v.is_finite() {
                return Err(FlowerError::InvalidEmbedding(format!(
                    "non-finite value {v} in sample embedding"
                )));
            }
            *sum += v as f64;
        }
    }

    let n = embeddings.len() as f64;
    Ok(Centroid {
        vector: sums.into_iter().map(|s| (s / n) as f32).collect(),
        samples: embeddings.len(),
    })
}
