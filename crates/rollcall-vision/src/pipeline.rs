//! Photograph-to-embeddings pipeline: decode, detect, align, embed.

use crate::alignment::align_face;
use crate::detector::{FaceBox, FaceDetector};
use crate::recognizer::FaceRecognizer;
use image::RgbImage;
use rollcall_core::{DetectedFace, Detection, ExtractError, FaceExtractor, ImageSize, Region};
use std::path::Path;

/// SCRFD detection model file name inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// ONNX-backed [`FaceExtractor`].
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))
            .map_err(|e| ExtractError::Model(e.to_string()))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))
            .map_err(|e| ExtractError::Model(e.to_string()))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.detector = self.detector.with_min_confidence(min_confidence);
        self
    }

    /// Detect and embed every face of an already-decoded photograph.
    pub fn extract(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractError> {
        let boxes = self
            .detector
            .detect(image)
            .map_err(|e| ExtractError::Model(e.to_string()))?;

        boxes
            .into_iter()
            .map(|face| {
                let aligned = align_face(image, &face.landmarks);
                let embedding = self
                    .recognizer
                    .embed(&aligned)
                    .map_err(|e| ExtractError::Model(e.to_string()))?;
                Ok(DetectedFace {
                    region: clamp_region(&face, image.width(), image.height()),
                    confidence: face.confidence,
                    embedding,
                })
            })
            .collect()
    }
}

impl FaceExtractor for OnnxExtractor {
    fn detect_faces(&mut self, image: &[u8]) -> Result<Detection, ExtractError> {
        let decoded = image::load_from_memory(image)
            .map_err(|e| ExtractError::Decode(e.to_string()))?
            .to_rgb8();
        let size = ImageSize {
            width: decoded.width(),
            height: decoded.height(),
        };
        let faces = self.extract(&decoded)?;
        tracing::debug!(width = size.width, height = size.height, faces = faces.len(), "photo processed");
        Ok(Detection { image: size, faces })
    }
}

/// Clip a detector box to the photograph bounds.
fn clamp_region(face: &FaceBox, width: u32, height: u32) -> Region {
    let (w, h) = (width as f32, height as f32);
    Region {
        x1: face.region.x1.clamp(0.0, w),
        y1: face.region.y1.clamp(0.0, h),
        x2: face.region.x2.clamp(0.0, w),
        y2: face.region.y2.clamp(0.0, h),
    }
}
