use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP request failed: {0}")]
    Other(String),
}

/// Outbound leg of a dispatch attempt. Any status code is a reply; only
/// failures to get one are errors.
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        bearer_token: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<TransportReply, TransportError>;
}

/// `reqwest` transport. The client is built on first use and reused afterwards.
pub struct HttpTransport {
    client: OnceLock<HttpClient>,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            client: OnceLock::new(),
            request_timeout,
        }
    }

    fn client(&self) -> &HttpClient {
        self.client.get_or_init(|| {
            match HttpClient::builder().timeout(self.request_timeout).build() {
                Ok(client) => client,
                Err(e) => {
                    log::warn!("Failed to build inference HTTP client, using defaults: {}", e);
                    HttpClient::new()
                }
            }
        })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

#[async_trait]
impl InferenceTransport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        bearer_token: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<TransportReply, TransportError> {
        let mut request = self.client().post(url).json(body);
        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportReply { status, body })
    }
}
