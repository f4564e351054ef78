//! Store gateway: the read/write contract against embedding persistence.

use crate::types::{Embedding, EmbeddingId, EmbeddingRecord, Identity, StoredEmbedding};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("corrupt stored row: {0}")]
    Corrupt(String),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Persistence of per-identity embedding sets.
///
/// Calls may block on I/O. Implementations must be safe for concurrent use
/// and strongly consistent within one caller's sequence of calls.
pub trait EmbeddingStore: Send + Sync {
    /// All embeddings owned by `identity`, oldest first.
    fn get_embeddings(&self, identity: &Identity) -> Result<Vec<StoredEmbedding>, StoreError>;

    /// Embeddings for every roster member. Members without embeddings map
    /// to an empty list rather than being omitted.
    fn get_roster_embeddings(
        &self,
        roster: &[Identity],
    ) -> Result<BTreeMap<Identity, Vec<StoredEmbedding>>, StoreError> {
        let mut out = BTreeMap::new();
        for identity in roster {
            out.insert(identity.clone(), self.get_embeddings(identity)?);
        }
        Ok(out)
    }

    fn insert_embedding(
        &self,
        identity: &Identity,
        embedding: &Embedding,
        created_at: DateTime<Utc>,
    ) -> Result<EmbeddingId, StoreError>;

    /// Returns false when no embedding had that id.
    fn delete_embedding(&self, id: EmbeddingId) -> Result<bool, StoreError>;

    /// Remove every embedding of `identity`, returning what was removed.
    fn delete_all_embeddings(&self, identity: &Identity)
        -> Result<Vec<EmbeddingRecord>, StoreError>;

    /// Metadata for every stored embedding.
    fn all_embeddings(&self) -> Result<Vec<EmbeddingRecord>, StoreError>;

    /// Insert the accepted candidate and delete the pruned embeddings.
    ///
    /// Backends with transactions should override this so that a failure
    /// leaves the set untouched.
    fn apply_enrollment(
        &self,
        identity: &Identity,
        embedding: &Embedding,
        created_at: DateTime<Utc>,
        prune: &[EmbeddingId],
    ) -> Result<EmbeddingId, StoreError> {
        let id = self.insert_embedding(identity, embedding, created_at)?;
        for pruned in prune {
            self.delete_embedding(*pruned)?;
        }
        Ok(id)
    }
}

/// In-memory [`EmbeddingStore`]. Data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<StoredEmbedding>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row with a caller-chosen id and timestamp.
    pub fn seed(&self, row: StoredEmbedding) -> Result<(), StoreError> {
        self.lock()?.push(row);
        Ok(())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<StoredEmbedding>>, StoreError> {
        self.rows.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl EmbeddingStore for MemoryStore {
    fn get_embeddings(&self, identity: &Identity) -> Result<Vec<StoredEmbedding>, StoreError> {
        let rows = self.lock()?;
        let mut out: Vec<StoredEmbedding> = rows
            .iter()
            .filter(|r| &r.identity == identity)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    fn insert_embedding(
        &self,
        identity: &Identity,
        embedding: &Embedding,
        created_at: DateTime<Utc>,
    ) -> Result<EmbeddingId, StoreError> {
        let id = Uuid::new_v4();
        self.lock()?.push(StoredEmbedding {
            id,
            identity: identity.clone(),
            embedding: embedding.clone(),
            created_at,
        });
        Ok(id)
    }

    fn delete_embedding(&self, id: EmbeddingId) -> Result<bool, StoreError> {
        let mut rows = self.lock()?;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        Ok(rows.len() != before)
    }

    fn delete_all_embeddings(
        &self,
        identity: &Identity,
    ) -> Result<Vec<EmbeddingRecord>, StoreError> {
        let mut rows = self.lock()?;
        let (removed, kept): (Vec<StoredEmbedding>, Vec<StoredEmbedding>) =
            rows.drain(..).partition(|r| &r.identity == identity);
        *rows = kept;
        Ok(removed.iter().map(StoredEmbedding::record).collect())
    }

    fn all_embeddings(&self) -> Result<Vec<EmbeddingRecord>, StoreError> {
        Ok(self.lock()?.iter().map(StoredEmbedding::record).collect())
    }

    fn apply_enrollment(
        &self,
        identity: &Identity,
        embedding: &Embedding,
        created_at: DateTime<Utc>,
        prune: &[EmbeddingId],
    ) -> Result<EmbeddingId, StoreError> {
        // Single critical section so readers never see a half-applied commit.
        let mut rows = self.lock()?;
        rows.retain(|r| !prune.contains(&r.id));
        let id = Uuid::new_v4();
        rows.push(StoredEmbedding {
            id,
            identity: identity.clone(),
            embedding: embedding.clone(),
            created_at,
        });
        Ok(id)
    }
}
