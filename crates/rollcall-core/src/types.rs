use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Store-assigned identifier of a single embedding.
pub type EmbeddingId = Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity key is empty")]
    Empty,
    #[error("identity key {0:?} contains characters other than ASCII letters and digits")]
    InvalidCharacters(String),
    #[error("identity key {key:?} must be {expected} characters, got {actual}")]
    WrongLength {
        key: String,
        expected: usize,
        actual: usize,
    },
}

/// Stable external key of an enrolled person (e.g. a roll number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Parse an identity key: trimmed, non-empty, ASCII alphanumeric.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(IdentityError::Empty);
        }
        if !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(IdentityError::InvalidCharacters(key.to_string()));
        }
        Ok(Self(key.to_string()))
    }

    /// Parse an identity key and additionally require an exact length.
    ///
    /// `expected_len == 0` disables the length rule.
    pub fn parse_with_len(raw: &str, expected_len: usize) -> Result<Self, IdentityError> {
        let identity = Self::parse(raw)?;
        let actual = identity.0.len();
        if expected_len > 0 && actual != expected_len {
            return Err(IdentityError::WrongLength {
                key: identity.0,
                expected: expected_len,
                actual,
            });
        }
        Ok(identity)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Face embedding vector produced by the extraction boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// False if any component is NaN or infinite. Such a vector never
    /// matches anything, including itself.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Panics if the dimensionalities differ: every stored embedding shares
    /// one dimension, so a mismatch here is a caller bug.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        assert_eq!(
            self.values.len(),
            other.values.len(),
            "embedding dimension mismatch"
        );
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// An embedding as persisted behind the store gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub id: EmbeddingId,
    pub identity: Identity,
    pub embedding: Embedding,
    pub created_at: DateTime<Utc>,
}

impl StoredEmbedding {
    pub fn record(&self) -> EmbeddingRecord {
        EmbeddingRecord {
            id: self.id,
            identity: self.identity.clone(),
            created_at: self.created_at,
        }
    }
}

/// Embedding metadata without the vector, used for sweeping and listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: EmbeddingId,
    pub identity: Identity,
    pub created_at: DateTime<Utc>,
}

/// Face bounding region in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Region {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// Pixel dimensions of a decoded photograph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// One face found by the extraction boundary.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub region: Region,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
    pub embedding: Embedding,
}

/// Everything the extraction boundary reports for one photograph.
#[derive(Debug, Clone)]
pub struct Detection {
    pub image: ImageSize,
    pub faces: Vec<DetectedFace>,
}
