use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Claims of the service token presented to inference backends.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CognitoTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Tokens are refreshed a minute before they expire.
    pub fn is_fresh(&self) -> bool {
        Utc::now() + Duration::seconds(60) < self.expires_at
    }
}
