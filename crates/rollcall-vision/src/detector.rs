//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the photograph into the square model input, decodes the
//! three anchor-free stride levels and suppresses overlapping boxes.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use rollcall_core::Region;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Default minimum detector score for a face to be reported.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A detected face in source-image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub region: Region,
    pub confidence: f32,
    /// Five-point landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: [(f32, f32); 5],
}

/// Scale, resized extent and padding applied when letterboxing.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    width: u32,
    height: u32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, target);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, target);
        Self {
            scale,
            width: new_w,
            height: new_h,
            pad_x: (target - new_w) / 2,
            pad_y: (target - new_h) / 2,
        }
    }

    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// (score, bbox, kps) output positions for one stride level.
type LevelOutputs = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    levels: [LevelOutputs; 3],
    min_confidence: f32,
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides x score/bbox/kps), got {}",
                names.len()
            )));
        }
        let levels = output_layout(&names);

        tracing::info!(path = %model_path.display(), outputs = ?names, ?levels, "loaded SCRFD model");

        Ok(Self {
            session,
            levels,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        })
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Detect faces in a colour photograph, highest confidence first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceBox>, DetectorError> {
        let (input, letterbox) = preprocess(image);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (level, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.levels[level];
            let extract = |idx: usize, what: &'static str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let scores = extract(score_idx, "scores")?;
            let bboxes = extract(bbox_idx, "bboxes")?;
            let kps = extract(kps_idx, "landmarks")?;

            candidates.extend(decode_level(
                scores,
                bboxes,
                kps,
                stride,
                &letterbox,
                self.min_confidence,
            ));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = faces.len(), "SCRFD detection finished");
        Ok(faces)
    }
}

/// Map output tensor names to stride levels.
///
/// Named exports ("score_8", "bbox_16", "kps_32", ...) are matched by name.
/// Anything else falls back to the stock ordering
/// [scores 8/16/32, bboxes 8/16/32, kps 8/16/32].
fn output_layout(names: &[String]) -> [LevelOutputs; 3] {
    let position = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let named: Option<Vec<LevelOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&s| Some((position("score", s)?, position("bbox", s)?, position("kps", s)?)))
        .collect();

    match named.as_deref() {
        Some(&[a, b, c]) => [a, b, c],
        _ => [(0, 3, 6), (1, 4, 7), (2, 5, 8)],
    }
}

/// Letterbox an RGB photograph into a normalized 1x3xNxN tensor.
///
/// Padding is filled with the mean so it normalizes to zero.
fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let size = SCRFD_INPUT_SIZE;
    let letterbox = Letterbox::fit(image.width(), image.height(), size);
    let resized = imageops::resize(image, letterbox.width, letterbox.height, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let ty = (y + letterbox.pad_y) as usize;
        let tx = (x + letterbox.pad_x) as usize;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel.0[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Decode one stride level into candidate faces above `threshold`.
fn decode_level(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<FaceBox> {
    let grid = SCRFD_INPUT_SIZE as usize / stride;
    let step = stride as f32;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;

    (0..anchors.min(scores.len()))
        .filter(|&idx| scores[idx] > threshold)
        .filter_map(|idx| {
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let cx = (cell % grid) as f32 * step;
            let cy = (cell / grid) as f32 * step;

            let b = bboxes.get(idx * 4..idx * 4 + 4)?;
            let k = kps.get(idx * 10..idx * 10 + 10)?;

            let (x1, y1) = letterbox.unmap(cx - b[0] * step, cy - b[1] * step);
            let (x2, y2) = letterbox.unmap(cx + b[2] * step, cy + b[3] * step);
            let landmarks = std::array::from_fn(|i| {
                letterbox.unmap(cx + k[i * 2] * step, cy + k[i * 2 + 1] * step)
            });

            Some(FaceBox {
                region: Region { x1, y1, x2, y2 },
                confidence: scores[idx],
                landmarks,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; output is sorted by confidence.
fn nms(mut candidates: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in candidates {
        if keep.iter().all(|k| iou(&k.region, &candidate.region) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-union of two regions.
fn iou(a: &Region, b: &Region) -> f32 {
    let w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = w * h;
    let union = a.width() * a.height() + b.width() * b.height() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
