//! Consensus enrollment service.

use crate::config::Config;
use crate::error::EngineError;
use crate::gateway::Gateway;
use crate::locks::IdentityLocks;
use crate::worker::ExtractorHandle;
use chrono::{DateTime, Utc};
use rollcall_core::consensus::{decide, Decision};
use rollcall_core::{Embedding, EmbeddingId, EmbeddingRecord, Identity, ImageSize, Region};
use serde::Serialize;
use std::time::Duration;

/// Result of one enrollment submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrollOutcome {
    Accepted {
        id: EmbeddingId,
        /// Embeddings agreeing with the candidate, the candidate included.
        agree: usize,
        pruned: Vec<EmbeddingId>,
    },
    Rejected { agree: usize, disagree: usize },
}

impl EnrollOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, EnrollOutcome::Accepted { .. })
    }
}

/// Enrollment from a photograph holding exactly one face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoEnrollment {
    pub outcome: EnrollOutcome,
    pub region: Region,
    pub image: ImageSize,
}

pub struct Enroller {
    gateway: Gateway,
    locks: IdentityLocks,
    extractor: Option<ExtractorHandle>,
    dimension: usize,
    tolerance: f32,
    identity_len: usize,
    detect_timeout: Duration,
}

impl Enroller {
    pub fn new(gateway: Gateway, locks: IdentityLocks, config: &Config) -> Self {
        Self {
            gateway,
            locks,
            extractor: None,
            dimension: config.dimension,
            tolerance: config.enrollment_tolerance,
            identity_len: config.identity_len,
            detect_timeout: config.detect_timeout(),
        }
    }

    /// Enable [`enroll_photo`](Self::enroll_photo).
    pub fn with_extractor(mut self, extractor: ExtractorHandle) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Validate a raw identity key against the configured format.
    pub fn parse_identity(&self, raw: &str) -> Result<Identity, EngineError> {
        Ok(Identity::parse_with_len(raw, self.identity_len)?)
    }

    pub async fn enroll(
        &self,
        identity: &Identity,
        embedding: Embedding,
    ) -> Result<EnrollOutcome, EngineError> {
        self.enroll_at(identity, embedding, Utc::now()).await
    }

    /// Submit `embedding` for `identity`, stamping it with `now` if accepted.
    ///
    /// The read, decision and commit run under the identity's lock, so two
    /// submissions for the same identity never decide against the same
    /// snapshot.
    pub async fn enroll_at(
        &self,
        identity: &Identity,
        embedding: Embedding,
        now: DateTime<Utc>,
    ) -> Result<EnrollOutcome, EngineError> {
        if embedding.dim() != self.dimension {
            return Err(EngineError::Dimension {
                expected: self.dimension,
                actual: embedding.dim(),
            });
        }
        if !embedding.is_finite() {
            return Err(EngineError::NonFinite);
        }

        let _guard = self.locks.lock(identity).await;
        let existing = self.gateway.embeddings(identity).await?;
        if let Some(bad) = existing.iter().find(|e| e.embedding.dim() != self.dimension) {
            return Err(EngineError::Dimension {
                expected: self.dimension,
                actual: bad.embedding.dim(),
            });
        }

        match decide(&existing, &embedding, self.tolerance) {
            Decision::Accept { keep, prune } => {
                let id = self
                    .gateway
                    .apply_enrollment(identity, &embedding, now, prune.clone())
                    .await?;
                tracing::info!(
                    %identity,
                    %id,
                    agree = keep.len() + 1,
                    pruned = prune.len(),
                    "enrollment accepted"
                );
                Ok(EnrollOutcome::Accepted {
                    id,
                    agree: keep.len() + 1,
                    pruned: prune,
                })
            }
            Decision::Reject { agree, disagree } => {
                tracing::info!(%identity, agree, disagree, "enrollment rejected");
                Ok(EnrollOutcome::Rejected { agree, disagree })
            }
        }
    }

    /// Extract the single face in `image` and enroll its embedding.
    pub async fn enroll_photo(
        &self,
        identity: &Identity,
        image: Vec<u8>,
    ) -> Result<PhotoEnrollment, EngineError> {
        let extractor = self.extractor.as_ref().ok_or(EngineError::NoExtractor)?;
        let detection = extractor.detect_within(image, self.detect_timeout).await?;

        let face = match <[_; 1]>::try_from(detection.faces) {
            Ok([face]) => face,
            Err(faces) => {
                tracing::info!(%identity, faces = faces.len(), "enrollment photo rejected");
                return Err(EngineError::FaceCount(faces.len()));
            }
        };

        let outcome = self.enroll(identity, face.embedding).await?;
        Ok(PhotoEnrollment {
            outcome,
            region: face.region,
            image: detection.image,
        })
    }

    /// Remove every embedding of `identity`, returning what was removed.
    pub async fn delete_identity(
        &self,
        identity: &Identity,
    ) -> Result<Vec<EmbeddingRecord>, EngineError> {
        let _guard = self.locks.lock(identity).await;
        let removed = self.gateway.delete_all(identity).await?;
        tracing::info!(%identity, removed = removed.len(), "identity deleted");
        Ok(removed)
    }

    /// Embedding metadata of `identity`, or of everyone when `None`,
    /// ordered by identity then age.
    pub async fn records(
        &self,
        identity: Option<&Identity>,
    ) -> Result<Vec<EmbeddingRecord>, EngineError> {
        let mut records = self.gateway.all_records().await?;
        if let Some(identity) = identity {
            records.retain(|r| &r.identity == identity);
        }
        records.sort_by(|a, b| {
            a.identity
                .cmp(&b.identity)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(records)
    }
}
