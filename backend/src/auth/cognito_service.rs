use chrono::{Duration, Utc};
use reqwest::Client as HttpClient;
use std::collections::HashMap;
use std::time::Duration as StdDuration;
use thiserror::Error;
use url::Url;

use super::models::{CachedToken, CognitoTokenResponse};

const TOKEN_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);

#[derive(Error, Debug)]
pub enum CognitoError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("URL parsing failed: {0}")]
    UrlError(#[from] url::ParseError),
    #[error("AWS Cognito error: {0}")]
    AwsError(String),
}

/// OAuth2 client-credentials client for a Cognito user pool domain.
#[derive(Clone)]
pub struct CognitoService {
    http_client: HttpClient,
    client_id: String,
    client_secret: String,
    domain: String,
    region: String,
    scope: String,
}

impl CognitoService {
    pub fn new(
        client_id: String,
        client_secret: String,
        domain: String,
        region: String,
        scope: String,
    ) -> Self {
        Self {
            http_client: token_client(),
            client_id,
            client_secret,
            domain,
            region,
            scope,
        }
    }

    pub fn token_url(&self) -> Result<Url, CognitoError> {
        Ok(Url::parse(&format!(
            "https://{}.auth.{}.amazoncognito.com/oauth2/token",
            self.domain, self.region
        ))?)
    }

    pub async fn request_client_token(&self) -> Result<CachedToken, CognitoError> {
        let token_url = self.token_url()?;

        let mut params = HashMap::new();
        params.insert("grant_type", "client_credentials");
        params.insert("client_id", &self.client_id);
        params.insert("client_secret", &self.client_secret);
        params.insert("scope", &self.scope);

        let response = self
            .http_client
            .post(token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(CognitoError::AwsError(format!(
                "Client credentials grant failed: {}",
                error_text
            )));
        }

        let token_response: CognitoTokenResponse = response.json().await?;
        if !token_response.token_type.eq_ignore_ascii_case("bearer") {
            return Err(CognitoError::AwsError(format!(
                "Unexpected token type: {}",
                token_response.token_type
            )));
        }

        log::info!(
            "Obtained Cognito access token valid for {}s",
            token_response.expires_in
        );
        Ok(CachedToken {
            token: token_response.access_token,
            expires_at: Utc::now() + Duration::seconds(token_response.expires_in as i64),
        })
    }
}

fn token_client() -> HttpClient {
    match HttpClient::builder().timeout(TOKEN_REQUEST_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            log::warn!("Failed to build Cognito HTTP client, using defaults: {}", e);
            HttpClient::new()
        }
    }
}
