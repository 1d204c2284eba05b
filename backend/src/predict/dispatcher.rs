use shared::{PredictParameters, Tier};
use std::sync::Arc;
use url::Url;

use super::models::{BackendPayload, InferenceRequestBody};
use super::normalizer::NormalizedInstance;
use super::retry::{RetryPolicy, RetryState};
use super::router::BackendTarget;
use super::transport::{InferenceTransport, TransportError, TransportReply};
use crate::auth::credentials::{CredentialError, CredentialProvider};
use crate::config::settings::{BackendEndpoints, ConfigError};

/// Why a single attempt failed. Classification into retryable/fatal is by variant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttemptFailure {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unparseable backend response: {0}")]
    Decode(String),
    #[error("could not encode request body: {0}")]
    Encode(String),
}

impl AttemptFailure {
    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptFailure::Transport(_) => true,
            AttemptFailure::Status { status, .. } => (500..600).contains(status),
            AttemptFailure::Decode(_) | AttemptFailure::Encode(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AttemptFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{target} still failing after {attempts} attempts: {last}")]
    Transient {
        target: BackendTarget,
        attempts: u32,
        last: AttemptFailure,
    },
    #[error("{target} failed permanently on attempt {attempts}: {failure}")]
    Fatal {
        target: BackendTarget,
        attempts: u32,
        failure: AttemptFailure,
    },
    #[error("credential error: {0}")]
    Auth(#[from] CredentialError),
}

#[derive(Debug)]
pub struct Dispatched {
    pub payload: BackendPayload,
    pub attempts: u32,
}

/// Calls one backend target with bounded, strictly sequential retries.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn InferenceTransport>,
    credentials: Arc<dyn CredentialProvider>,
    fallback_credentials: Option<Arc<dyn CredentialProvider>>,
    primary_base: Url,
    fallback_base: Option<Url>,
    policy: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn InferenceTransport>,
        credentials: Arc<dyn CredentialProvider>,
        endpoints: &BackendEndpoints,
        policy: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| ConfigError::Invalid(format!("bad backend URL '{}': {}", raw, e)))
        };
        Ok(Self {
            transport,
            credentials,
            fallback_credentials: None,
            primary_base: parse(&endpoints.primary_base_url)?,
            fallback_base: endpoints.fallback_base_url.as_deref().map(parse).transpose()?,
            policy,
        })
    }

    /// Tokens for the fallback tier come from `provider` instead of the shared one.
    pub fn with_fallback_credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.fallback_credentials = Some(provider);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn url_for(&self, target: &BackendTarget) -> Option<String> {
        let identifier = target.identifier.trim_matches('/');
        match target.tier {
            Tier::Primary => Some(format!(
                "{}/{}",
                self.primary_base.as_str().trim_end_matches('/'),
                identifier
            )),
            Tier::Fallback => self.fallback_base.as_ref().map(|base| {
                format!(
                    "{}/v1/{}:predict",
                    base.as_str().trim_end_matches('/'),
                    identifier
                )
            }),
        }
    }

    pub async fn dispatch(
        &self,
        target: &BackendTarget,
        instances: &[NormalizedInstance],
        parameters: &PredictParameters,
    ) -> Result<Dispatched, DispatchError> {
        let fatal = |attempts, failure| DispatchError::Fatal {
            target: target.clone(),
            attempts,
            failure,
        };

        let url = self.url_for(target).ok_or_else(|| {
            fatal(
                0,
                AttemptFailure::Transport(TransportError::Other(
                    "no base URL configured for tier".into(),
                )),
            )
        })?;
        let body = serde_json::to_value(InferenceRequestBody {
            instances,
            parameters,
        })
        .map_err(|e| fatal(0, AttemptFailure::Encode(e.to_string())))?;

        let mut state = RetryState::default();
        loop {
            let token = self.bearer_token(target).await?;
            state.attempt += 1;
            if let Some(previous) = &state.last_failure {
                log::debug!(
                    "Retrying {} (attempt {}, {:?} waited so far) after: {}",
                    target,
                    state.attempt,
                    state.cumulative_delay,
                    previous
                );
            }

            let outcome = match tokio::time::timeout(
                self.policy.attempt_timeout,
                self.transport.post_json(&url, token.as_deref(), &body),
            )
            .await
            {
                Ok(Ok(reply)) => parse_reply(reply),
                Ok(Err(e)) => Err(AttemptFailure::Transport(e)),
                Err(_) => Err(AttemptFailure::Transport(TransportError::Timeout)),
            };

            let failure = match outcome {
                Ok(payload) => {
                    log::info!(
                        "Dispatch to {} succeeded on attempt {}/{} with {} prediction entries",
                        target,
                        state.attempt,
                        self.policy.max_attempts(),
                        payload.predictions.len()
                    );
                    return Ok(Dispatched {
                        payload,
                        attempts: state.attempt,
                    });
                }
                Err(failure) => failure,
            };

            if !failure.is_retryable() {
                log::error!(
                    "Dispatch to {} failed on attempt {} (status {:?}), not retrying: {}",
                    target,
                    state.attempt,
                    failure.status(),
                    failure
                );
                return Err(fatal(state.attempt, failure));
            }

            if state.attempt >= self.policy.max_attempts() {
                log::error!(
                    "Dispatch to {} exhausted {} attempts after {:?} of backoff: {}",
                    target,
                    state.attempt,
                    state.cumulative_delay,
                    failure
                );
                return Err(DispatchError::Transient {
                    target: target.clone(),
                    attempts: state.attempt,
                    last: failure,
                });
            }

            let delay = self.policy.delay(state.attempt);
            log::warn!(
                "Dispatch to {} attempt {}/{} failed: {}; retrying in {:?}",
                target,
                state.attempt,
                self.policy.max_attempts(),
                failure,
                delay
            );
            state.cumulative_delay += delay;
            state.last_failure = Some(failure);
            tokio::time::sleep(delay).await;
        }
    }
}

impl Dispatcher {
    /// Token lookup is bounded by the attempt timeout but does not consume an attempt.
    async fn bearer_token(&self, target: &BackendTarget) -> Result<Option<String>, CredentialError> {
        let provider = match (target.tier, &self.fallback_credentials) {
            (Tier::Fallback, Some(provider)) => provider,
            _ => &self.credentials,
        };
        match tokio::time::timeout(self.policy.attempt_timeout, provider.bearer_token()).await {
            Ok(token) => token,
            Err(_) => {
                log::error!(
                    "No bearer token for {} within {:?}",
                    target,
                    self.policy.attempt_timeout
                );
                Err(CredentialError::Request(format!(
                    "token provider did not answer within {:?}",
                    self.policy.attempt_timeout
                )))
            }
        }
    }
}

fn parse_reply(reply: TransportReply) -> Result<BackendPayload, AttemptFailure> {
    if (200..300).contains(&reply.status) {
        serde_json::from_str(&reply.body).map_err(|e| AttemptFailure::Decode(e.to_string()))
    } else {
        Err(AttemptFailure::Status {
            status: reply.status,
            body: reply.body,
        })
    }
}
