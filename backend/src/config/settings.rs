use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub default_category: String,
    pub routes: BTreeMap<String, RouteConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
    pub backends: BackendEndpoints,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Credentials for the fallback tier; when absent it shares `credentials`.
    #[serde(default)]
    pub fallback_credentials: Option<CredentialsConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// A configured route: `path` selects the primary tier, `resource` the managed
/// fallback tier. At least one of the two must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            unit_ms: default_unit_ms(),
            jitter_ms: default_jitter_ms(),
            max_delay_ms: default_max_delay_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEndpoints {
    pub primary_base_url: String,
    #[serde(default)]
    pub fallback_base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialsConfig {
    #[default]
    None,
    /// Token read from `INFERENCE_API_TOKEN`.
    Static {
        #[serde(default, skip_serializing)]
        token: Option<String>,
    },
    /// HS256 service token signed with `JWT_SECRET`.
    Jwt {
        issuer: String,
        audience: String,
        #[serde(default = "default_token_ttl_secs")]
        ttl_secs: i64,
        #[serde(default, skip_serializing)]
        secret: Option<String>,
    },
    /// OAuth2 client-credentials grant against a Cognito domain.
    Cognito {
        scope: String,
        #[serde(default)]
        domain: Option<String>,
        #[serde(default)]
        region: Option<String>,
        #[serde(default, skip_serializing)]
        client_id: Option<String>,
        #[serde(default, skip_serializing)]
        client_secret: Option<String>,
    },
}

/// Environment variables holding the secrets of one credentials block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialEnv {
    pub token: &'static str,
    pub jwt_secret: &'static str,
    pub cognito_domain: &'static str,
    pub region: &'static str,
    pub client_id: &'static str,
    pub client_secret: &'static str,
}

impl CredentialEnv {
    pub const PRIMARY: CredentialEnv = CredentialEnv {
        token: "INFERENCE_API_TOKEN",
        jwt_secret: "JWT_SECRET",
        cognito_domain: "COGNITO_DOMAIN",
        region: "AWS_REGION",
        client_id: "COGNITO_CLIENT_ID",
        client_secret: "COGNITO_CLIENT_SECRET",
    };

    pub const FALLBACK: CredentialEnv = CredentialEnv {
        token: "FALLBACK_INFERENCE_API_TOKEN",
        jwt_secret: "FALLBACK_JWT_SECRET",
        cognito_domain: "FALLBACK_COGNITO_DOMAIN",
        region: "AWS_REGION",
        client_id: "FALLBACK_COGNITO_CLIENT_ID",
        client_secret: "FALLBACK_COGNITO_CLIENT_SECRET",
    };
}

impl CredentialsConfig {
    /// Fills secrets from the environment and fails on any still missing.
    pub fn apply_env<F>(&mut self, env: &CredentialEnv, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            CredentialsConfig::None => {}
            CredentialsConfig::Static { token } => {
                if let Some(value) = lookup(env.token) {
                    *token = Some(value);
                }
                if token.is_none() {
                    return Err(ConfigError::MissingEnv(env.token));
                }
            }
            CredentialsConfig::Jwt { secret, .. } => {
                if let Some(value) = lookup(env.jwt_secret) {
                    *secret = Some(value);
                }
                if secret.is_none() {
                    return Err(ConfigError::MissingEnv(env.jwt_secret));
                }
            }
            CredentialsConfig::Cognito {
                domain,
                region,
                client_id,
                client_secret,
                ..
            } => {
                let fields: [(&mut Option<String>, &'static str); 4] = [
                    (domain, env.cognito_domain),
                    (region, env.region),
                    (client_id, env.client_id),
                    (client_secret, env.client_secret),
                ];
                for (field, key) in fields {
                    if let Some(value) = lookup(key) {
                        *field = Some(value);
                    }
                    if field.is_none() {
                        return Err(ConfigError::MissingEnv(key));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub predictions_table: Option<String>,
    #[serde(default = "default_attach_timeout_ms")]
    pub attach_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bucket: None,
            predictions_table: None,
            attach_timeout_ms: default_attach_timeout_ms(),
        }
    }
}

impl StorageConfig {
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }
}

fn default_port() -> u16 {
    8081
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_base() -> f64 {
    2.0
}
fn default_unit_ms() -> u64 {
    250
}
fn default_jitter_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    4_000
}
fn default_attempt_timeout_ms() -> u64 {
    10_000
}
fn default_token_ttl_secs() -> i64 {
    3_600
}
fn default_attach_timeout_ms() -> u64 {
    250
}
fn default_true() -> bool {
    true
}

impl GatewayConfig {
    /// Reads `$GATEWAY_CONFIG` (or `config/gateway.yaml` next to the workspace),
    /// then applies environment overrides and validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = match env::var("GATEWAY_CONFIG") {
            Ok(path) => path,
            Err(_) => match env::var("CARGO_MANIFEST_DIR") {
                Ok(manifest_dir) => format!("{}/../config/gateway.yaml", manifest_dir),
                Err(_) => "config/gateway.yaml".to_string(),
            },
        };
        log::info!("Loading gateway configuration from {}", config_path);

        let config_str = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: config_path.clone(),
            source,
        })?;
        let mut config = Self::from_yaml(&config_str)?;
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Environment wins over the file for endpoints, storage names and secrets.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a valid port: {}", port)))?;
        }
        if let Some(url) = lookup("INFERENCE_BASE_URL") {
            self.backends.primary_base_url = url;
        }
        if let Some(url) = lookup("FALLBACK_BASE_URL") {
            self.backends.fallback_base_url = Some(url);
        }
        if let Some(bucket) = lookup("S3_BUCKET_NAME") {
            self.storage.bucket = Some(bucket);
        }
        if let Some(table) = lookup("DYNAMODB_PREDICTIONS_TABLE") {
            self.storage.predictions_table = Some(table);
        }

        self.credentials.apply_env(&CredentialEnv::PRIMARY, &lookup)?;
        if let Some(fallback) = &mut self.fallback_credentials {
            fallback.apply_env(&CredentialEnv::FALLBACK, &lookup)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.routes.is_empty() {
            return Err(ConfigError::Invalid("no category routes configured".into()));
        }
        if !self.routes.contains_key(&self.default_category.trim().to_lowercase()) {
            return Err(ConfigError::Invalid(format!(
                "default category '{}' has no route",
                self.default_category
            )));
        }
        for (category, route) in &self.routes {
            if category.trim().to_lowercase() != *category {
                return Err(ConfigError::Invalid(format!(
                    "category keys must be lowercase and trimmed: '{}'",
                    category
                )));
            }
            if route.path.is_none() && route.resource.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "route '{}' needs a path or a resource",
                    category
                )));
            }
            if route.resource.is_some() && self.backends.fallback_base_url.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "route '{}' uses the fallback tier but no fallback_base_url is set",
                    category
                )));
            }
        }
        if self.retry.backoff_base < 1.0 || !self.retry.backoff_base.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_base must be >= 1, got {}",
                self.retry.backoff_base
            )));
        }
        if self.retry.unit_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.unit_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        if self.storage.enabled
            && (self.storage.bucket.is_none() || self.storage.predictions_table.is_none())
        {
            return Err(ConfigError::Invalid(
                "storage is enabled but S3_BUCKET_NAME or DYNAMODB_PREDICTIONS_TABLE is unset"
                    .into(),
            ));
        }
        Ok(())
    }
}
