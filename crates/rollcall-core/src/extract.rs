//! Detection/extraction boundary.

use crate::types::Detection;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("model failure: {0}")]
    Model(String),
}

/// Finds faces in a photograph and embeds each one.
///
/// Implementations must be deterministic for a fixed model version. An
/// empty face list is a valid answer, not an error.
pub trait FaceExtractor: Send {
    fn detect_faces(&mut self, image: &[u8]) -> Result<Detection, ExtractError>;
}
