//! Fakes for the extraction and notification boundaries.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rollcall_core::{
    DetectedFace, Detection, EmbeddingStore, ExtractError, FaceExtractor, Identity, ImageSize,
    MemoryStore, Notifier, NotifyError, Region, StoredEmbedding,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub fn s(key: &str) -> Identity {
    Identity::parse(key).unwrap()
}

/// Insert an embedding `age_days` old directly into the store.
pub fn seed(store: &MemoryStore, identity: &str, values: Vec<f32>, age_days: i64) -> Uuid {
    let id = Uuid::new_v4();
    store
        .seed(StoredEmbedding {
            id,
            identity: s(identity),
            embedding: values.into(),
            created_at: Utc::now() - ChronoDuration::days(age_days),
        })
        .unwrap();
    id
}

pub fn count(store: &MemoryStore, identity: &str) -> usize {
    store.get_embeddings(&s(identity)).unwrap().len()
}

/// Returns the same scripted detection for every photograph.
pub struct ScriptedExtractor {
    faces: Vec<DetectedFace>,
    failure: Option<ExtractError>,
    delay: Duration,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self {
            faces: Vec::new(),
            failure: None,
            delay: Duration::ZERO,
        }
    }

    pub fn failing(err: ExtractError) -> Self {
        Self {
            failure: Some(err),
            ..Self::new()
        }
    }

    /// Add a face whose box starts at `x`.
    pub fn face(mut self, x: f32, values: Vec<f32>) -> Self {
        self.faces.push(DetectedFace {
            region: Region {
                x1: x,
                y1: 0.0,
                x2: x + 20.0,
                y2: 20.0,
            },
            confidence: 0.9,
            embedding: values.into(),
        });
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl FaceExtractor for ScriptedExtractor {
    fn detect_faces(&mut self, _image: &[u8]) -> Result<Detection, ExtractError> {
        std::thread::sleep(self.delay);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(Detection {
            image: ImageSize {
                width: 640,
                height: 480,
            },
            faces: self.faces.clone(),
        })
    }
}

/// Records every reminder; optionally fails for one identity.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<(Identity, usize)>>>,
    fail_for: Option<Identity>,
}

impl RecordingNotifier {
    pub fn failing_for(identity: &str) -> Self {
        Self {
            fail_for: Some(s(identity)),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(Identity, usize)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_low_coverage(&self, identity: &Identity, remaining: usize) -> Result<(), NotifyError> {
        if self.fail_for.as_ref() == Some(identity) {
            return Err(NotifyError {
                identity: identity.clone(),
                reason: "mailbox unavailable".into(),
            });
        }
        self.sent.lock().unwrap().push((identity.clone(), remaining));
        Ok(())
    }
}

pub fn at_days_from_now(days: i64) -> DateTime<Utc> {
    Utc::now() + ChronoDuration::days(days)
}
