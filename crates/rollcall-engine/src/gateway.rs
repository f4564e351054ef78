//! Async facade over a blocking [`EmbeddingStore`].
//!
//! Every call runs on tokio's blocking pool so storage I/O never stalls
//! the async workers.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use rollcall_core::{
    Embedding, EmbeddingId, EmbeddingRecord, EmbeddingStore, Identity, StoreError,
    StoredEmbedding,
};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn EmbeddingStore>,
}

impl Gateway {
    pub fn new(store: Arc<dyn EmbeddingStore>) -> Self {
        Self { store }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn EmbeddingStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| EngineError::Join(e.to_string()))?
            .map_err(EngineError::from)
    }

    pub async fn embeddings(&self, identity: &Identity) -> Result<Vec<StoredEmbedding>, EngineError> {
        let identity = identity.clone();
        self.run(move |s| s.get_embeddings(&identity)).await
    }

    pub async fn roster(
        &self,
        roster: &[Identity],
    ) -> Result<BTreeMap<Identity, Vec<StoredEmbedding>>, EngineError> {
        let roster = roster.to_vec();
        self.run(move |s| s.get_roster_embeddings(&roster)).await
    }

    pub async fn apply_enrollment(
        &self,
        identity: &Identity,
        embedding: &Embedding,
        created_at: DateTime<Utc>,
        prune: Vec<EmbeddingId>,
    ) -> Result<EmbeddingId, EngineError> {
        let identity = identity.clone();
        let embedding = embedding.clone();
        self.run(move |s| s.apply_enrollment(&identity, &embedding, created_at, &prune))
            .await
    }

    pub async fn delete_embedding(&self, id: EmbeddingId) -> Result<bool, EngineError> {
        self.run(move |s| s.delete_embedding(id)).await
    }

    pub async fn delete_all(&self, identity: &Identity) -> Result<Vec<EmbeddingRecord>, EngineError> {
        let identity = identity.clone();
        self.run(move |s| s.delete_all_embeddings(&identity)).await
    }

    pub async fn all_records(&self) -> Result<Vec<EmbeddingRecord>, EngineError> {
        self.run(|s| s.all_embeddings()).await
    }
}
