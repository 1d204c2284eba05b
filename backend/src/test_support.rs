//! In-memory collaborators shared by the unit tests.

use async_trait::async_trait;
use shared::PredictRequest;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::credentials::{CredentialError, CredentialProvider, NoCredentials};
use crate::config::settings::GatewayConfig;
use crate::predict::dispatcher::Dispatcher;
use crate::predict::gateway::PredictionGateway;
use crate::predict::retry::RetryPolicy;
use crate::predict::router::VeinTypeRouter;
use crate::predict::transport::{InferenceTransport, TransportError, TransportReply};
use crate::storage::models::PredictionRecord;
use crate::storage::side_effects::{
    ArtifactStore, PredictionLog, SideEffectCoordinator, StorageError,
};

pub const TEST_CONFIG: &str = r#"
default_category: alpha
routes:
  alpha:
    path: alpha
    resource: projects/p/locations/l/endpoints/1
  beta:
    path: beta
  gamma:
    path: gamma
backends:
  primary_base_url: http://inference.local/predict
  fallback_base_url: https://managed.example.com
retry:
  max_retries: 2
  unit_ms: 1
  jitter_ms: 1
  max_delay_ms: 5
  attempt_timeout_ms: 1000
storage:
  enabled: false
"#;

pub fn fast_policy() -> RetryPolicy {
    let config = GatewayConfig::from_yaml(TEST_CONFIG).unwrap();
    RetryPolicy::from(&config.retry)
}

pub fn ok_reply(entries: &[(&str, f64)]) -> Result<TransportReply, TransportError> {
    let predictions: Vec<serde_json::Value> = entries
        .iter()
        .map(|(label, confidence)| serde_json::json!({"label": label, "confidence": confidence}))
        .collect();
    Ok(TransportReply {
        status: 200,
        body: serde_json::json!({"predictions": predictions, "modelId": "test-model"}).to_string(),
    })
}

pub fn status_reply(status: u16) -> Result<TransportReply, TransportError> {
    Ok(TransportReply {
        status,
        body: format!("status {}", status),
    })
}

pub fn request(body: serde_json::Value) -> PredictRequest {
    serde_json::from_value(body).unwrap()
}

/// Polls `condition` for up to a second.
pub async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Replays scripted replies in order; the last one repeats once the script runs out.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<TransportReply, TransportError>>>,
    repeat: Mutex<Option<Result<TransportReply, TransportError>>>,
    latency: Duration,
    calls: AtomicU32,
    urls: Mutex<Vec<String>>,
    tokens: Mutex<Vec<Option<String>>>,
    bodies: Mutex<Vec<serde_json::Value>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<TransportReply, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: Mutex::new(None),
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
            urls: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            bodies: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(reply: Result<TransportReply, TransportError>) -> Self {
        Self::new(vec![reply])
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub fn last_token(&self) -> Option<String> {
        self.tokens.lock().unwrap().last().cloned().flatten()
    }

    pub fn last_body(&self) -> Option<serde_json::Value> {
        self.bodies.lock().unwrap().last().cloned()
    }

    fn next_reply(&self) -> Result<TransportReply, TransportError> {
        let mut repeat = self.repeat.lock().unwrap();
        match self.script.lock().unwrap().pop_front() {
            Some(reply) => {
                *repeat = Some(reply.clone());
                reply
            }
            None => repeat
                .clone()
                .unwrap_or_else(|| Err(TransportError::Other("script is empty".into()))),
        }
    }
}

#[async_trait]
impl InferenceTransport for ScriptedTransport {
    async fn post_json(
        &self,
        url: &str,
        bearer_token: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<TransportReply, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        self.tokens.lock().unwrap().push(bearer_token.map(str::to_string));
        self.bodies.lock().unwrap().push(body.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.next_reply()
    }
}

pub struct FailingCredentials;

#[async_trait]
impl CredentialProvider for FailingCredentials {
    async fn bearer_token(&self) -> Result<Option<String>, CredentialError> {
        Err(CredentialError::Request("token endpoint unreachable".into()))
    }
}

/// Never hands out a token.
pub struct HangingCredentials;

#[async_trait]
impl CredentialProvider for HangingCredentials {
    async fn bearer_token(&self) -> Result<Option<String>, CredentialError> {
        std::future::pending().await
    }
}

#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<Vec<(String, Vec<u8>, String)>>,
    latency: Duration,
}

impl MemoryArtifactStore {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            objects: Mutex::new(Vec::new()),
            latency,
        }
    }

    pub fn objects(&self) -> Vec<(String, Vec<u8>, String)> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &str, data: Vec<u8>, media_type: &str) -> Result<String, StorageError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.objects
            .lock()
            .unwrap()
            .push((key.to_string(), data, media_type.to_string()));
        Ok(format!("mem://{}", key))
    }
}

pub struct FailingArtifactStore;

#[async_trait]
impl ArtifactStore for FailingArtifactStore {
    async fn put(&self, _key: &str, _data: Vec<u8>, _media_type: &str) -> Result<String, StorageError> {
        Err(StorageError::Upstream("connection refused".into()))
    }
}

#[derive(Default)]
pub struct MemoryPredictionLog {
    records: Mutex<Vec<PredictionRecord>>,
}

impl MemoryPredictionLog {
    pub fn records(&self) -> Vec<PredictionRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl PredictionLog for MemoryPredictionLog {
    async fn record(&self, record: &PredictionRecord) -> Result<(), StorageError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub fn gateway_with(
    transport: Arc<dyn InferenceTransport>,
    storage: Option<(Arc<dyn ArtifactStore>, Arc<dyn PredictionLog>)>,
) -> PredictionGateway {
    gateway_with_credentials(transport, Arc::new(NoCredentials), storage)
}

pub fn gateway_with_credentials(
    transport: Arc<dyn InferenceTransport>,
    credentials: Arc<dyn CredentialProvider>,
    storage: Option<(Arc<dyn ArtifactStore>, Arc<dyn PredictionLog>)>,
) -> PredictionGateway {
    build_gateway(transport, credentials, storage, Duration::from_secs(1))
}

pub fn gateway_with_attach_timeout(
    transport: Arc<dyn InferenceTransport>,
    storage: (Arc<dyn ArtifactStore>, Arc<dyn PredictionLog>),
    attach_timeout: Duration,
) -> PredictionGateway {
    build_gateway(transport, Arc::new(NoCredentials), Some(storage), attach_timeout)
}

fn build_gateway(
    transport: Arc<dyn InferenceTransport>,
    credentials: Arc<dyn CredentialProvider>,
    storage: Option<(Arc<dyn ArtifactStore>, Arc<dyn PredictionLog>)>,
    attach_timeout: Duration,
) -> PredictionGateway {
    let config = GatewayConfig::from_yaml(TEST_CONFIG).unwrap();
    let dispatcher = Dispatcher::new(
        transport,
        credentials,
        &config.backends,
        RetryPolicy::from(&config.retry),
    )
    .unwrap();
    PredictionGateway::new(
        VeinTypeRouter::from_config(&config),
        dispatcher,
        storage.map(|(store, log)| SideEffectCoordinator::new(store, log)),
        attach_timeout,
    )
}
