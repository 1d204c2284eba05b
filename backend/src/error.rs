use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::auth::credentials::CredentialError;
use crate::predict::dispatcher::{AttemptFailure, DispatchError};

/// Bad client input: malformed instance, empty request or unknown category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub instance_index: Option<usize>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            instance_index: None,
        }
    }

    pub fn at(message: impl Into<String>, index: usize) -> Self {
        Self {
            message: message.into(),
            instance_index: Some(index),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("backend for '{category}' unavailable after {attempts} attempts: {source}")]
    UpstreamTransient {
        category: String,
        attempts: u32,
        source: AttemptFailure,
    },
    #[error("backend for '{category}' rejected the request on attempt {attempts}: {source}")]
    UpstreamFatal {
        category: String,
        attempts: u32,
        source: AttemptFailure,
    },
    #[error("no predictions returned for '{category}'")]
    EmptyResult { category: String },
    #[error("could not obtain backend credentials for '{category}': {source}")]
    Auth {
        category: String,
        source: CredentialError,
    },
}

impl GatewayError {
    pub fn from_dispatch(category: &str, err: DispatchError) -> Self {
        let category = category.to_string();
        match err {
            DispatchError::Transient { attempts, last, .. } => GatewayError::UpstreamTransient {
                category,
                attempts,
                source: last,
            },
            DispatchError::Fatal {
                attempts, failure, ..
            } => GatewayError::UpstreamFatal {
                category,
                attempts,
                source: failure,
            },
            DispatchError::Auth(source) => GatewayError::Auth { category, source },
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            GatewayError::Validation(err) => ErrorResponse {
                error: err.message.clone(),
                instance_index: err.instance_index,
                message: None,
                category: None,
            },
            GatewayError::EmptyResult { .. } => ErrorResponse {
                error: "no predictions".into(),
                instance_index: None,
                message: None,
                category: None,
            },
            GatewayError::UpstreamTransient {
                category, source, ..
            } => ErrorResponse {
                error: "inference backend unavailable".into(),
                instance_index: None,
                message: Some(source.to_string()),
                category: Some(category.clone()),
            },
            GatewayError::UpstreamFatal {
                category, source, ..
            } => ErrorResponse {
                error: "inference backend rejected the request".into(),
                instance_index: None,
                message: Some(source.to_string()),
                category: Some(category.clone()),
            },
            GatewayError::Auth { category, source } => ErrorResponse {
                error: "authentication failed".into(),
                instance_index: None,
                message: Some(source.to_string()),
                category: Some(category.clone()),
            },
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::EmptyResult { .. } => StatusCode::NOT_FOUND,
            GatewayError::UpstreamTransient { .. } | GatewayError::UpstreamFatal { .. } => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::Auth { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.body())
    }
}
