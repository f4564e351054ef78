//! Lecture match service: one classroom photograph against a roster.

use crate::config::Config;
use crate::error::EngineError;
use crate::gateway::Gateway;
use crate::sweep::Sweeper;
use crate::worker::ExtractorHandle;
use rollcall_core::{match_faces, Identity, LectureReport};
use std::sync::Arc;
use std::time::Duration;

pub struct LectureMatcher {
    gateway: Gateway,
    extractor: ExtractorHandle,
    presweep: Option<Arc<Sweeper>>,
    dimension: usize,
    tolerance: f32,
    detect_timeout: Duration,
}

impl LectureMatcher {
    pub fn new(gateway: Gateway, extractor: ExtractorHandle, config: &Config) -> Self {
        Self {
            gateway,
            extractor,
            presweep: None,
            dimension: config.dimension,
            tolerance: config.lecture_tolerance,
            detect_timeout: config.detect_timeout(),
        }
    }

    /// Run a quiet sweep before each match so expired embeddings never vote.
    pub fn with_presweep(mut self, sweeper: Arc<Sweeper>) -> Self {
        self.presweep = Some(sweeper);
        self
    }

    /// Match every face in `image` against the embeddings of `roster`.
    ///
    /// A photograph without faces is a normal outcome
    /// ([`LectureReport::no_faces_detected`]); a detection timeout or store
    /// failure is an error.
    pub async fn match_photo(
        &self,
        image: Vec<u8>,
        roster: &[Identity],
    ) -> Result<LectureReport, EngineError> {
        if let Some(sweeper) = &self.presweep {
            sweeper.sweep(false).await?;
        }

        let snapshot = self.gateway.roster(roster).await?;
        let detection = self.extractor.detect_within(image, self.detect_timeout).await?;

        let stored = snapshot.values().flatten().map(|s| &s.embedding);
        let detected = detection.faces.iter().map(|f| &f.embedding);
        for embedding in stored.chain(detected) {
            if embedding.dim() != self.dimension {
                return Err(EngineError::Dimension {
                    expected: self.dimension,
                    actual: embedding.dim(),
                });
            }
            if !embedding.is_finite() {
                return Err(EngineError::NonFinite);
            }
        }

        let tolerance = self.tolerance;
        let report = tokio::task::spawn_blocking(move || match_faces(&detection, &snapshot, tolerance))
            .await
            .map_err(|e| EngineError::Join(e.to_string()))?;

        tracing::info!(
            roster = roster.len(),
            faces = report.faces_detected(),
            found = report.found.len(),
            not_found = report.not_found.len(),
            ambiguous = report.found.iter().filter(|f| f.is_ambiguous()).count(),
            encodings_missing = report.encodings_missing.len(),
            "lecture photo matched"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::IdentityLocks;
    use crate::testutil::{count, s, seed, RecordingNotifier, ScriptedExtractor};
    use crate::worker::spawn_extractor;
    use rollcall_core::{ExtractError, MemoryStore};
    use std::collections::BTreeMap;

    fn config() -> Config {
        Config {
            dimension: 2,
            lecture_tolerance: 0.5,
            ..Config::default()
        }
    }

    fn matcher(store: &Arc<MemoryStore>, extractor: ScriptedExtractor) -> LectureMatcher {
        LectureMatcher::new(
            Gateway::new(store.clone()),
            spawn_extractor(Box::new(extractor)).unwrap(),
            &config(),
        )
    }

    #[tokio::test]
    async fn test_single_match_with_missing_coverage() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "S1", vec![0.0, 0.0], 0);
        let extractor = ScriptedExtractor::new().face(10.0, vec![0.1, 0.0]);

        let report = matcher(&store, extractor)
            .match_photo(vec![1], &[s("S1"), s("S2")])
            .await
            .unwrap();
        assert_eq!(report.found.len(), 1);
        assert_eq!(report.found[0].region.x1, 10.0);
        assert_eq!(report.found[0].tally, BTreeMap::from([(s("S1"), 1)]));
        assert!(report.not_found.is_empty());
        assert_eq!(report.encodings_missing, vec![s("S2")]);
    }

    #[tokio::test]
    async fn test_no_faces_is_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "S1", vec![0.0, 0.0], 0);

        let report = matcher(&store, ScriptedExtractor::new())
            .match_photo(vec![1], &[s("S1")])
            .await
            .unwrap();
        assert!(report.no_faces_detected());
        assert!(report.encodings_missing.is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_face_kept() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "S1", vec![0.0, 0.0], 0);
        let extractor = ScriptedExtractor::new()
            .face(0.0, vec![0.0, 0.1])
            .face(50.0, vec![4.0, 4.0]);

        let report = matcher(&store, extractor)
            .match_photo(vec![1], &[s("S1")])
            .await
            .unwrap();
        assert_eq!(report.found.len(), 1);
        assert_eq!(report.not_found.len(), 1);
        assert_eq!(report.not_found[0].x1, 50.0);
        assert!(!report.no_faces_detected());
    }

    #[tokio::test]
    async fn test_ambiguous_face_reports_full_tally() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "S1", vec![0.0, 0.0], 0);
        seed(&store, "S1", vec![0.1, 0.0], 0);
        seed(&store, "S2", vec![0.2, 0.0], 0);
        let extractor = ScriptedExtractor::new().face(0.0, vec![0.1, 0.1]);

        let report = matcher(&store, extractor)
            .match_photo(vec![1], &[s("S1"), s("S2")])
            .await
            .unwrap();
        let face = &report.found[0];
        assert!(face.is_ambiguous());
        assert_eq!(face.tally, BTreeMap::from([(s("S1"), 2), (s("S2"), 1)]));
        assert_eq!(face.leader(), Some(&s("S1")));
    }

    #[tokio::test]
    async fn test_identity_may_be_voted_on_several_faces() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "S1", vec![0.0, 0.0], 0);
        let extractor = ScriptedExtractor::new()
            .face(0.0, vec![0.1, 0.0])
            .face(40.0, vec![0.0, 0.1]);

        let report = matcher(&store, extractor)
            .match_photo(vec![1], &[s("S1")])
            .await
            .unwrap();
        assert_eq!(report.found.len(), 2);
        assert_eq!(report.identities_present().len(), 1);
    }

    #[tokio::test]
    async fn test_non_roster_embeddings_ignored() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "S9", vec![0.0, 0.0], 0);
        let extractor = ScriptedExtractor::new().face(0.0, vec![0.0, 0.0]);

        let report = matcher(&store, extractor)
            .match_photo(vec![1], &[s("S1")])
            .await
            .unwrap();
        assert!(report.found.is_empty());
        assert_eq!(report.not_found.len(), 1);
        assert_eq!(report.encodings_missing, vec![s("S1")]);
    }

    #[tokio::test]
    async fn test_detection_timeout_is_transient_error() {
        let store = Arc::new(MemoryStore::new());
        let extractor = ScriptedExtractor::new().delay(Duration::from_millis(500));
        let matcher = LectureMatcher::new(
            Gateway::new(store.clone()),
            spawn_extractor(Box::new(extractor)).unwrap(),
            &Config {
                detect_timeout_secs: 1,
                ..config()
            },
        );
        // Shrink below the scripted delay.
        let matcher = LectureMatcher {
            detect_timeout: Duration::from_millis(20),
            ..matcher
        };

        let err = matcher.match_photo(vec![1], &[s("S1")]).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_extractor_dimension_mismatch_rejected() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "S1", vec![0.0, 0.0], 0);
        let extractor = ScriptedExtractor::new().face(0.0, vec![0.0, 0.0, 0.0]);

        let err = matcher(&store, extractor)
            .match_photo(vec![1], &[s("S1")])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Dimension { expected: 2, actual: 3 }));
    }

    #[tokio::test]
    async fn test_non_finite_face_rejected() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "S1", vec![0.0, 0.0], 0);
        let extractor = ScriptedExtractor::new()
            .face(0.0, vec![0.0, 0.0])
            .face(40.0, vec![f32::NAN, 0.0]);

        let err = matcher(&store, extractor)
            .match_photo(vec![1], &[s("S1")])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NonFinite));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_decode_failure_propagates() {
        let store = Arc::new(MemoryStore::new());
        let extractor = ScriptedExtractor::failing(ExtractError::Decode("truncated".into()));
        let err = matcher(&store, extractor)
            .match_photo(vec![1], &[s("S1")])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Extract(ExtractError::Decode(_))));
    }

    #[tokio::test]
    async fn test_presweep_drops_expired_votes() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "S1", vec![0.0, 0.0], 10);
        let notifier = RecordingNotifier::default();
        let sweeper = Arc::new(Sweeper::new(
            Gateway::new(store.clone()),
            IdentityLocks::new(),
            Arc::new(notifier.clone()),
            &config(),
        ));
        let extractor = ScriptedExtractor::new().face(0.0, vec![0.0, 0.0]);

        let report = matcher(&store, extractor)
            .with_presweep(sweeper)
            .match_photo(vec![1], &[s("S1")])
            .await
            .unwrap();
        assert!(report.found.is_empty());
        assert_eq!(report.encodings_missing, vec![s("S1")]);
        assert_eq!(count(&store, "S1"), 0);
        assert!(notifier.sent().is_empty());
    }
}
