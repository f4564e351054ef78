use crate::error::EngineError;
use rollcall_core::{Detection, FaceExtractor};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Messages sent from async callers to the extractor thread.
enum ExtractorRequest {
    Detect {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Detection, EngineError>>,
    },
}

/// Clone-safe handle to the extractor thread.
#[derive(Clone)]
pub struct ExtractorHandle {
    tx: mpsc::Sender<ExtractorRequest>,
}

impl ExtractorHandle {
    /// Decode a photograph and return every face found in it.
    pub async fn detect(&self, image: Vec<u8>) -> Result<Detection, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ExtractorRequest::Detect {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::WorkerGone)?;
        reply_rx.await.map_err(|_| EngineError::WorkerGone)?
    }

    /// [`detect`](Self::detect) bounded by `limit`.
    ///
    /// A request that times out still runs to completion on the worker;
    /// its reply is dropped.
    pub async fn detect_within(
        &self,
        image: Vec<u8>,
        limit: Duration,
    ) -> Result<Detection, EngineError> {
        tokio::time::timeout(limit, self.detect(image))
            .await
            .map_err(|_| {
                tracing::warn!(limit_ms = limit.as_millis() as u64, "face detection timed out");
                EngineError::Timeout(limit)
            })?
    }
}

/// Spawn the extractor on a dedicated OS thread.
///
/// Inference is CPU-bound and the extractor needs `&mut self`, so requests
/// are queued and handled one at a time. The thread exits once every
/// handle is dropped.
pub fn spawn_extractor(
    mut extractor: Box<dyn FaceExtractor>,
) -> Result<ExtractorHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<ExtractorRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-extractor".into())
        .spawn(move || {
            tracing::info!("extractor thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    ExtractorRequest::Detect { image, reply } => {
                        let result = extractor
                            .detect_faces(&image)
                            .map_err(EngineError::from);
                        if let Ok(detection) = &result {
                            tracing::debug!(faces = detection.faces.len(), "detection finished");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("extractor thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(ExtractorHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedExtractor;
    use rollcall_core::ExtractError;

    #[tokio::test]
    async fn test_detect_round_trips_through_thread() {
        let extractor = ScriptedExtractor::new().face(10.0, vec![1.0, 0.0]).face(50.0, vec![0.0, 1.0]);
        let handle = spawn_extractor(Box::new(extractor)).unwrap();
        let detection = handle.detect(b"photo".to_vec()).await.unwrap();
        assert_eq!(detection.faces.len(), 2);
    }

    #[tokio::test]
    async fn test_extractor_error_is_forwarded() {
        let extractor = ScriptedExtractor::failing(ExtractError::Decode("not an image".into()));
        let handle = spawn_extractor(Box::new(extractor)).unwrap();
        let err = handle.detect(vec![]).await.unwrap_err();
        assert!(matches!(err, EngineError::Extract(ExtractError::Decode(_))));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_slow_extractor_times_out() {
        let extractor = ScriptedExtractor::new().delay(Duration::from_millis(500));
        let handle = spawn_extractor(Box::new(extractor)).unwrap();
        let err = handle
            .detect_within(vec![], Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
        assert!(err.is_transient());
    }
}
