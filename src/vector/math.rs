//! Vector math used by the builder and the flat index.

use crate::vector::VectorError;

/// Scales `vector` to unit Euclidean length.
///
/// After normalization the inner product of two vectors equals their cosine
/// similarity, which is what the flat index scores with.
pub fn l2_normalize(vector: &[f32]) -> Result<Vec<f32>, VectorError> {
    if vector.is_empty() {
        return Err(VectorError::InvalidDimension {
            dimension: 0,
            reason: "Cannot normalize an empty vector",
        });
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(VectorError::ZeroVector);
    }

    Ok(vector.iter().map(|x| x / norm).collect())
}

/// Inner product of two equally sized vectors.
///
/// Callers guarantee equal length; the index validates dimensions once per
/// query instead of once per entry.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity for vectors that are not known to be normalized.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = dot_product(a, b);
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot / (magnitude_a * magnitude_b)
}
