use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::cognito_service::CognitoService;
use super::jwt::JwtService;
use super::models::CachedToken;
use crate::config::settings::{ConfigError, CredentialEnv, CredentialsConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error("token request failed: {0}")]
    Request(String),
}

/// Supplies the bearer token attached to backend calls, if any.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<Option<String>, CredentialError>;
}

pub struct NoCredentials;

#[async_trait]
impl CredentialProvider for NoCredentials {
    async fn bearer_token(&self) -> Result<Option<String>, CredentialError> {
        Ok(None)
    }
}

pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken(token.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Result<Option<String>, CredentialError> {
        Ok(Some(self.0.clone()))
    }
}

/// Holds the last token until it is about to expire. Concurrent callers
/// queue on the lock so only one refresh is in flight.
#[derive(Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<String, CredentialError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedToken, CredentialError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref().filter(|cached| cached.is_fresh()) {
            return Ok(cached.token.clone());
        }

        let fresh = refresh().await?;
        let token = fresh.token.clone();
        *slot = Some(fresh);
        Ok(token)
    }
}

pub struct JwtTokenProvider {
    jwt: JwtService,
    cache: TokenCache,
}

#[async_trait]
impl CredentialProvider for JwtTokenProvider {
    async fn bearer_token(&self) -> Result<Option<String>, CredentialError> {
        let token = self
            .cache
            .get_or_refresh(|| async {
                self.jwt
                    .generate_service_token()
                    .map_err(|e| CredentialError::Signing(e.to_string()))
            })
            .await?;
        Ok(Some(token))
    }
}

pub struct CognitoTokenProvider {
    cognito: CognitoService,
    cache: TokenCache,
}

#[async_trait]
impl CredentialProvider for CognitoTokenProvider {
    async fn bearer_token(&self) -> Result<Option<String>, CredentialError> {
        let token = self
            .cache
            .get_or_refresh(|| async {
                self.cognito.request_client_token().await.map_err(|e| {
                    log::error!("Failed to obtain Cognito access token: {:?}", e);
                    CredentialError::Request(e.to_string())
                })
            })
            .await?;
        Ok(Some(token))
    }
}

pub fn provider_from_config(
    config: &CredentialsConfig,
    env: &CredentialEnv,
) -> Result<Arc<dyn CredentialProvider>, ConfigError> {
    let provider: Arc<dyn CredentialProvider> = match config {
        CredentialsConfig::None => Arc::new(NoCredentials),
        CredentialsConfig::Static { token } => {
            let token = token.clone().ok_or(ConfigError::MissingEnv(env.token))?;
            Arc::new(StaticToken::new(token))
        }
        CredentialsConfig::Jwt {
            issuer,
            audience,
            ttl_secs,
            secret,
        } => {
            let secret = secret.as_deref().ok_or(ConfigError::MissingEnv(env.jwt_secret))?;
            Arc::new(JwtTokenProvider {
                jwt: JwtService::new(secret, issuer.clone(), audience.clone(), *ttl_secs),
                cache: TokenCache::default(),
            })
        }
        CredentialsConfig::Cognito {
            scope,
            domain,
            region,
            client_id,
            client_secret,
        } => {
            let required = |value: &Option<String>, key: &'static str| {
                value.clone().ok_or(ConfigError::MissingEnv(key))
            };
            Arc::new(CognitoTokenProvider {
                cognito: CognitoService::new(
                    required(client_id, env.client_id)?,
                    required(client_secret, env.client_secret)?,
                    required(domain, env.cognito_domain)?,
                    required(region, env.region)?,
                    scope.clone(),
                ),
                cache: TokenCache::default(),
            })
        }
    };
    Ok(provider)
}
