//! Scalar vector math shared by the index strategies.
//!
//! All indexes store L2-normalized vectors, so cosine similarity reduces to
//! a dot product clamped to [-1, 1].

use crate::error::IndexError;

/// Calculate the dot product between two vectors.
///
/// # Panics
///
/// Debug-panics if vectors have different lengths.
#[inline]
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Calculate the L2 norm (magnitude) of a vector.
#[inline]
#[must_use]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalize a vector to unit length.
///
/// Returns `None` when the vector has zero magnitude.
#[must_use]
pub fn normalize(v: &[f32]) -> Option<Vec<f32>> {
    let norm = l2_norm(v);
    if norm == 0.0 {
        return None;
    }
    let inv = 1.0 / norm;
    Some(v.iter().map(|x| x * inv).collect())
}

/// Cosine similarity of two unit-length vectors, clamped to [-1, 1].
#[inline]
#[must_use]
pub fn unit_cosine(a: &[f32], b: &[f32]) -> f32 {
    dot_product(a, b).clamp(-1.0, 1.0)
}

/// Validate a vector against an index dimension and normalize it.
///
/// # Errors
///
/// Returns [`IndexError::DimensionMismatch`] on a length mismatch and
/// [`IndexError::ZeroVector`] when the vector cannot be normalized.
pub fn checked_unit(vector: &[f32], dim: usize) -> Result<Vec<f32>, IndexError> {
    if vector.len() != dim {
        return Err(IndexError::DimensionMismatch { expected: dim, actual: vector.len() });
    }
    normalize(vector).ok_or(IndexError::ZeroVector)
}
