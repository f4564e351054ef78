use rollcall_core::{ExtractError, IdentityError, StoreError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid identity: {0}")]
    Identity(#[from] IdentityError),
    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimension { expected: usize, actual: usize },
    #[error("embedding has non-finite components")]
    NonFinite,
    #[error("expected exactly one face in the enrollment photo, found {0}; try again with a different photo")]
    FaceCount(usize),
    #[error("photo enrollment requires a face extractor")]
    NoExtractor,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("face extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("face detection timed out after {0:?}")]
    Timeout(Duration),
    #[error("extractor worker exited")]
    WorkerGone,
    #[error("failed to spawn extractor worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("blocking task failed: {0}")]
    Join(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Collaborator failures a caller may retry. Nothing was committed.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Store(_)
            | EngineError::Timeout(_)
            | EngineError::WorkerGone
            | EngineError::Join(_) => true,
            EngineError::Extract(e) => matches!(e, ExtractError::Model(_)),
            _ => false,
        }
    }
}
