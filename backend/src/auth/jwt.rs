use super::models::{CachedToken, Claims};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

const SERVICE_SUBJECT: &str = "vein-gateway";

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT encoding error: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
    #[error("Invalid token lifetime: {0}s")]
    InvalidLifetime(i64),
}

/// Signs short-lived HS256 service tokens for backends sharing `JWT_SECRET`.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl JwtService {
    pub fn new(secret: &str, issuer: String, audience: String, ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            issuer,
            audience,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    pub fn generate_service_token(&self) -> Result<CachedToken, JwtError> {
        if self.ttl <= Duration::zero() {
            return Err(JwtError::InvalidLifetime(self.ttl.num_seconds()));
        }

        let now = Utc::now();
        let expiration = now + self.ttl;

        let claims = Claims {
            sub: SERVICE_SUBJECT.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: expiration.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let header = Header::new(Algorithm::HS256);
        let token = encode(&header, &claims, &self.encoding_key)?;
        log::debug!("Signed service token for audience {}", self.audience);
        Ok(CachedToken {
            token,
            expires_at: expiration,
        })
    }
}
