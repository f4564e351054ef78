//! Lecture vote tallying.
//!
//! Every detected face is compared against every roster embedding. Each
//! matching embedding casts one vote for its owner. The full tally is
//! reported per face; no identity is forced onto at most one face.

use crate::compare::matches;
use crate::types::{Detection, Embedding, Identity, ImageSize, Region, StoredEmbedding};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Matching-embedding count per identity for one face.
pub type VoteTally = BTreeMap<Identity, usize>;

/// A face that received at least one vote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoundFace {
    pub region: Region,
    pub tally: VoteTally,
}

impl FoundFace {
    /// More than one identity received votes for this face.
    pub fn is_ambiguous(&self) -> bool {
        self.tally.len() > 1
    }

    /// Identity with the most votes, or `None` when the lead is shared.
    pub fn leader(&self) -> Option<&Identity> {
        let mut ranked: Vec<(&Identity, &usize)> = self.tally.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1));
        match ranked.as_slice() {
            [(top, n), (_, m), ..] if n > m => Some(*top),
            [(top, _)] => Some(*top),
            _ => None,
        }
    }
}

/// Result of matching one photograph against a roster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LectureReport {
    pub image: ImageSize,
    pub found: Vec<FoundFace>,
    /// Faces with zero votes, kept for manual resolution.
    pub not_found: Vec<Region>,
    /// Roster members with no stored embeddings; they can never be matched.
    pub encodings_missing: Vec<Identity>,
}

impl LectureReport {
    /// The detector found no faces at all.
    pub fn no_faces_detected(&self) -> bool {
        self.found.is_empty() && self.not_found.is_empty()
    }

    pub fn faces_detected(&self) -> usize {
        self.found.len() + self.not_found.len()
    }

    /// Every identity that received a vote on any face.
    pub fn identities_present(&self) -> BTreeSet<&Identity> {
        self.found.iter().flat_map(|f| f.tally.keys()).collect()
    }
}

/// Tally votes for a single probe embedding.
pub fn tally_face(
    probe: &Embedding,
    gallery: &[(&Identity, &Embedding)],
    tolerance: f32,
) -> VoteTally {
    let mut tally = VoteTally::new();
    for (identity, embedding) in gallery {
        if matches(embedding, probe, tolerance) {
            *tally.entry((*identity).clone()).or_default() += 1;
        }
    }
    tally
}

/// Match every detected face against the roster's embeddings.
pub fn match_faces(
    detection: &Detection,
    roster: &BTreeMap<Identity, Vec<StoredEmbedding>>,
    tolerance: f32,
) -> LectureReport {
    let encodings_missing: Vec<Identity> = roster
        .iter()
        .filter(|(_, embeddings)| embeddings.is_empty())
        .map(|(identity, _)| identity.clone())
        .collect();

    let gallery: Vec<(&Identity, &Embedding)> = roster
        .iter()
        .flat_map(|(identity, embeddings)| embeddings.iter().map(move |s| (identity, &s.embedding)))
        .collect();

    let mut found = Vec::new();
    let mut not_found = Vec::new();
    for face in &detection.faces {
        let tally = tally_face(&face.embedding, &gallery, tolerance);
        if tally.is_empty() {
            not_found.push(face.region);
        } else {
            found.push(FoundFace {
                region: face.region,
                tally,
            });
        }
    }

    LectureReport {
        image: detection.image,
        found,
        not_found,
        encodings_missing,
    }
}
