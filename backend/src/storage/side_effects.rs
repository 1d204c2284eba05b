use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use shared::StoredArtifact;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use super::models::PredictionRecord;
use super::s3_service::S3Service;
use crate::predict::normalizer::NormalizedInstance;

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("could not encode artifact: {0}")]
    Encoding(String),
    #[error("artifact store unavailable: {0}")]
    Upstream(String),
    #[error("background task failed: {0}")]
    Task(String),
}

/// Blob storage for request inputs and serialized results.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores `data` under `key` and returns a stable reference to it.
    async fn put(&self, key: &str, data: Vec<u8>, media_type: &str) -> Result<String, StorageError>;
}

#[async_trait]
pub trait PredictionLog: Send + Sync {
    async fn record(&self, record: &PredictionRecord) -> Result<(), StorageError>;
}

/// Runs persistence off the request path. Nothing here can fail a request:
/// errors are logged and surface only as a missing `storage` annotation.
#[derive(Clone)]
pub struct SideEffectCoordinator {
    store: Arc<dyn ArtifactStore>,
    log: Arc<dyn PredictionLog>,
}

/// Input upload started for one request.
pub struct PendingInput {
    request_id: Uuid,
    state: InputState,
}

enum InputState {
    Disabled,
    Running(JoinHandle<Result<StoredArtifact, StorageError>>),
    Finished(Option<StoredArtifact>),
}

impl SideEffectCoordinator {
    pub fn new(store: Arc<dyn ArtifactStore>, log: Arc<dyn PredictionLog>) -> Self {
        Self { store, log }
    }

    /// Starts uploading the normalized inputs right away so the upload
    /// overlaps with the backend call.
    pub fn begin_input(
        &self,
        request_id: Uuid,
        category: &str,
        instances: &[NormalizedInstance],
    ) -> PendingInput {
        let store = self.store.clone();
        let category = category.to_string();
        let instances = instances.to_vec();

        let handle = actix_web::rt::spawn(async move {
            persist_inputs(store.as_ref(), &category, &instances).await
        });

        PendingInput {
            request_id,
            state: InputState::Running(handle),
        }
    }

    /// Fire-and-forget: the returned task is never awaited by the request.
    /// An input upload still running is awaited here so the record carries
    /// its final references.
    pub fn record_result(&self, mut record: PredictionRecord, input: PendingInput) {
        let store = self.store.clone();
        let prediction_log = self.log.clone();

        actix_web::rt::spawn(async move {
            let request_id = record.request_id;
            if let Some(artifact) = input.finish().await {
                record.input_refs = artifact.input_refs;
            }
            match persist_result(store.as_ref(), prediction_log.as_ref(), record).await {
                Ok(()) => log::debug!("Persisted prediction result for request {}", request_id),
                Err(e) => log::warn!(
                    "Failed to persist prediction result for request {}: {}",
                    request_id,
                    e
                ),
            }
        });
    }
}

impl PendingInput {
    pub fn disabled(request_id: Uuid) -> Self {
        Self {
            request_id,
            state: InputState::Disabled,
        }
    }

    /// Waits at most `wait` for the input upload. A slow upload keeps running
    /// and can still be collected by `finish`.
    pub async fn settle(&mut self, wait: Duration) -> Option<StoredArtifact> {
        let handle = match &mut self.state {
            InputState::Running(handle) => handle,
            InputState::Finished(artifact) => return artifact.clone(),
            InputState::Disabled => return None,
        };

        let artifact = match tokio::time::timeout(wait, handle).await {
            Ok(joined) => collect(self.request_id, joined),
            Err(_) => {
                log::warn!(
                    "Input persistence for request {} still running after {:?}; responding without it",
                    self.request_id,
                    wait
                );
                return None;
            }
        };
        self.state = InputState::Finished(artifact.clone());
        artifact
    }

    /// Waits for the upload without a bound. Only called off the request path.
    pub async fn finish(self) -> Option<StoredArtifact> {
        match self.state {
            InputState::Running(handle) => {
                let joined = handle.await;
                collect(self.request_id, joined)
            }
            InputState::Finished(artifact) => artifact,
            InputState::Disabled => None,
        }
    }

    /// Cancels the upload when the request produced no result.
    pub fn abandon(self) {
        if let InputState::Running(handle) = self.state {
            log::debug!("Abandoning input persistence for request {}", self.request_id);
            handle.abort();
        }
    }
}

fn collect(
    request_id: Uuid,
    joined: Result<Result<StoredArtifact, StorageError>, JoinError>,
) -> Option<StoredArtifact> {
    match joined.map_err(|e| StorageError::Task(e.to_string())).and_then(|uploaded| uploaded) {
        Ok(artifact) => Some(artifact),
        Err(e) => {
            log::warn!("Input persistence failed for request {}: {}", request_id, e);
            None
        }
    }
}

async fn persist_inputs(
    store: &dyn ArtifactStore,
    category: &str,
    instances: &[NormalizedInstance],
) -> Result<StoredArtifact, StorageError> {
    let mut input_refs = Vec::with_capacity(instances.len());
    for instance in instances {
        let data = STANDARD
            .decode(&instance.content)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;
        let media_type = media_type_for(instance.mime_type.as_deref(), &data);
        let key = S3Service::generate_input_key(
            category,
            &S3Service::calculate_image_hash(&data),
            S3Service::extract_file_extension(&media_type),
        );
        input_refs.push(store.put(&key, data, &media_type).await?);
    }

    Ok(StoredArtifact {
        input_refs,
        stored_at: Utc::now().to_rfc3339(),
    })
}

async fn persist_result(
    store: &dyn ArtifactStore,
    prediction_log: &dyn PredictionLog,
    mut record: PredictionRecord,
) -> Result<(), StorageError> {
    let body =
        serde_json::to_vec(&record.result).map_err(|e| StorageError::Encoding(e.to_string()))?;
    let key = format!("results/{}.json", record.request_id);
    record.result_ref = Some(store.put(&key, body, "application/json").await?);
    prediction_log.record(&record).await
}

/// Declared media type wins; otherwise sniff the magic bytes.
fn media_type_for(declared: Option<&str>, data: &[u8]) -> String {
    match declared {
        Some(media_type) => media_type.to_string(),
        None => image::guess_format(data)
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| FALLBACK_MEDIA_TYPE.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingArtifactStore, MemoryArtifactStore, MemoryPredictionLog, wait_for};
    use shared::{PredictionEntry, PredictionResult, Tier};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn instance(content: &str, mime_type: Option<&str>) -> NormalizedInstance {
        NormalizedInstance {
            content: content.into(),
            mime_type: mime_type.map(str::to_string),
        }
    }

    fn result() -> PredictionResult {
        PredictionResult {
            predictions: vec![PredictionEntry {
                label: "arterial".into(),
                confidence: 0.9,
                percentage: "90.00%".into(),
            }],
            model_id: None,
        }
    }

    #[test]
    fn sniffs_media_type_when_undeclared() {
        assert_eq!(media_type_for(None, PNG_MAGIC), "image/png");
        assert_eq!(media_type_for(Some("image/webp"), PNG_MAGIC), "image/webp");
        assert_eq!(media_type_for(None, b"ABC"), FALLBACK_MEDIA_TYPE);
    }

    #[actix_web::test]
    async fn stores_decoded_inputs_under_content_keys() {
        let store = Arc::new(MemoryArtifactStore::default());
        let coordinator = SideEffectCoordinator::new(store.clone(), Arc::new(MemoryPredictionLog::default()));

        let artifact = coordinator
            .begin_input(Uuid::new_v4(), "alpha", &[instance("QUJD", Some("image/png"))])
            .settle(Duration::from_secs(1))
            .await
            .unwrap();

        let hash = S3Service::calculate_image_hash(b"ABC");
        assert_eq!(artifact.input_refs, vec![format!("mem://inputs/alpha/{}.png", hash)]);
        let objects = store.objects();
        assert_eq!(objects[0].1, b"ABC");
        assert_eq!(objects[0].2, "image/png");
    }

    #[actix_web::test]
    async fn undecodable_content_yields_no_artifact() {
        let store = Arc::new(MemoryArtifactStore::default());
        let coordinator = SideEffectCoordinator::new(store.clone(), Arc::new(MemoryPredictionLog::default()));

        let artifact = coordinator
            .begin_input(Uuid::new_v4(), "alpha", &[instance("not*base64", None)])
            .settle(Duration::from_secs(1))
            .await;
        assert!(artifact.is_none());
        assert!(store.objects().is_empty());
    }

    #[actix_web::test]
    async fn store_failure_yields_no_artifact() {
        let coordinator = SideEffectCoordinator::new(
            Arc::new(FailingArtifactStore),
            Arc::new(MemoryPredictionLog::default()),
        );
        let artifact = coordinator
            .begin_input(Uuid::new_v4(), "alpha", &[instance("QUJD", None)])
            .settle(Duration::from_secs(1))
            .await;
        assert!(artifact.is_none());
    }

    #[actix_web::test]
    async fn slow_store_does_not_hold_the_caller() {
        let store = Arc::new(MemoryArtifactStore::with_latency(Duration::from_millis(300)));
        let coordinator = SideEffectCoordinator::new(store.clone(), Arc::new(MemoryPredictionLog::default()));

        let started = std::time::Instant::now();
        let artifact = coordinator
            .begin_input(Uuid::new_v4(), "alpha", &[instance("QUJD", None)])
            .settle(Duration::from_millis(10))
            .await;
        assert!(artifact.is_none());
        assert!(started.elapsed() < Duration::from_millis(300));

        // the upload keeps going in the background
        assert!(wait_for(|| !store.objects().is_empty()).await);
    }

    #[actix_web::test]
    async fn late_input_upload_still_reaches_the_record() {
        let store = Arc::new(MemoryArtifactStore::with_latency(Duration::from_millis(100)));
        let log = Arc::new(MemoryPredictionLog::default());
        let coordinator = SideEffectCoordinator::new(store.clone(), log.clone());

        let request_id = Uuid::new_v4();
        let mut pending = coordinator.begin_input(request_id, "alpha", &[instance("QUJD", None)]);
        assert!(pending.settle(Duration::from_millis(5)).await.is_none());

        coordinator.record_result(
            PredictionRecord::new(request_id, "alpha".into(), Tier::Primary, 1, vec![], result()),
            pending,
        );

        assert!(wait_for(|| !log.records().is_empty()).await);
        let records = log.records();
        let hash = S3Service::calculate_image_hash(b"ABC");
        assert_eq!(records[0].input_refs, vec![format!("mem://inputs/alpha/{}.bin", hash)]);
    }

    #[actix_web::test]
    async fn settled_input_is_reused_by_the_record() {
        let store = Arc::new(MemoryArtifactStore::default());
        let log = Arc::new(MemoryPredictionLog::default());
        let coordinator = SideEffectCoordinator::new(store.clone(), log.clone());

        let request_id = Uuid::new_v4();
        let mut pending = coordinator.begin_input(request_id, "beta", &[instance("QUJD", Some("image/png"))]);
        let artifact = pending.settle(Duration::from_secs(1)).await.unwrap();
        assert_eq!(pending.settle(Duration::ZERO).await, Some(artifact.clone()));

        coordinator.record_result(
            PredictionRecord::new(request_id, "beta".into(), Tier::Primary, 1, vec![], result()),
            pending,
        );

        assert!(wait_for(|| !log.records().is_empty()).await);
        assert_eq!(log.records()[0].input_refs, artifact.input_refs);
        // one input blob plus the result blob
        assert_eq!(store.objects().len(), 2);
    }

    #[actix_web::test]
    async fn records_result_in_the_background() {
        let store = Arc::new(MemoryArtifactStore::default());
        let log = Arc::new(MemoryPredictionLog::default());
        let coordinator = SideEffectCoordinator::new(store.clone(), log.clone());

        let request_id = Uuid::new_v4();
        coordinator.record_result(
            PredictionRecord::new(request_id, "alpha".into(), Tier::Primary, 1, vec![], result()),
            PendingInput::disabled(request_id),
        );

        assert!(wait_for(|| !log.records().is_empty()).await);
        let records = log.records();
        let record = &records[0];
        assert_eq!(record.request_id, request_id);
        assert_eq!(
            record.result_ref.as_deref(),
            Some(format!("mem://results/{}.json", request_id).as_str())
        );
    }

    #[actix_web::test]
    async fn result_persistence_failure_is_swallowed() {
        let log = Arc::new(MemoryPredictionLog::default());
        let coordinator = SideEffectCoordinator::new(Arc::new(FailingArtifactStore), log.clone());
        let request_id = Uuid::new_v4();
        coordinator.record_result(
            PredictionRecord::new(request_id, "alpha".into(), Tier::Primary, 1, vec![], result()),
            PendingInput::disabled(request_id),
        );

        assert!(!wait_for(|| !log.records().is_empty()).await);
    }
}
