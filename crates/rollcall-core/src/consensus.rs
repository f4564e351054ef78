//! Majority-vote enrollment decision.
//!
//! A candidate embedding joins an identity's set only when strictly more
//! existing embeddings agree with it than disagree. On acceptance the
//! disagreeing embeddings are outliers relative to the new consensus and
//! are pruned. Ties reject.

use crate::compare::matches;
use crate::types::{Embedding, EmbeddingId, StoredEmbedding};

/// Outcome of [`decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Store the candidate, keep `keep`, delete `prune`.
    Accept {
        keep: Vec<EmbeddingId>,
        prune: Vec<EmbeddingId>,
    },
    /// Store nothing, delete nothing.
    Reject { agree: usize, disagree: usize },
}

impl Decision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept { .. })
    }
}

/// Decide whether `candidate` may join `existing`.
///
/// An empty `existing` set always accepts.
pub fn decide(existing: &[StoredEmbedding], candidate: &Embedding, tolerance: f32) -> Decision {
    let (agree, disagree): (Vec<&StoredEmbedding>, Vec<&StoredEmbedding>) = existing
        .iter()
        .partition(|stored| matches(&stored.embedding, candidate, tolerance));

    if agree.len() > disagree.len() || existing.is_empty() {
        Decision::Accept {
            keep: agree.iter().map(|s| s.id).collect(),
            prune: disagree.iter().map(|s| s.id).collect(),
        }
    } else {
        Decision::Reject {
            agree: agree.len(),
            disagree: disagree.len(),
        }
    }
}
