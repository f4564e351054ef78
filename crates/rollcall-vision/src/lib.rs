//! rollcall-vision — Face extraction for classroom photographs.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime on CPU. [`OnnxExtractor`] implements the
//! core [`FaceExtractor`](rollcall_core::FaceExtractor) boundary.

pub mod alignment;
pub mod detector;
pub mod pipeline;
pub mod recognizer;

pub use detector::{DetectorError, FaceBox, FaceDetector};
pub use pipeline::{OnnxExtractor, ARCFACE_MODEL_FILE, SCRFD_MODEL_FILE};
pub use recognizer::{FaceRecognizer, RecognizerError};
