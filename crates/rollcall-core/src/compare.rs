//! Embedding comparator.

use crate::types::Embedding;

/// Euclidean distance between two embeddings. Symmetric, zero iff equal.
pub fn distance(a: &Embedding, b: &Embedding) -> f32 {
    a.euclidean_distance(b)
}

/// True iff `distance(a, b) <= tolerance`.
pub fn matches(a: &Embedding, b: &Embedding, tolerance: f32) -> bool {
    distance(a, b) <= tolerance
}
