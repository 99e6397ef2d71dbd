// Error types module

use bytes::Bytes;
use http::{header, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// Authentication and authorization failures surfaced by the protection gate
/// and the API key check.
///
/// The `Display` text carries the specific cause and is meant for logs.
/// Clients only ever see [`AuthError::client_message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No usable `Authorization: Bearer` header (401)
    #[error("auth missing")]
    TokenMissing,

    /// Token could not be parsed or failed verification (401)
    #[error("invalid token: {0}")]
    TokenInvalid(String),

    /// Token was well formed but its `exp` has passed (401)
    #[error("token expired")]
    TokenExpired,

    /// The verification key named by the token could not be resolved (401)
    #[error("key resolution failed: {0}")]
    KeyResolution(String),

    /// The scope claim was present but not a string (403)
    #[error("scope claim is not a space-delimited string")]
    ScopeEncodingInvalid,

    /// The route's authorization predicate evaluated to false (403)
    #[error("{requirement}")]
    AuthorizationDenied { requirement: String },

    /// No `X-Api-Key` header (401)
    #[error("api key missing")]
    ApiKeyMissing,

    /// `X-Api-Key` did not match the configured key (403)
    #[error("api key invalid")]
    ApiKeyInvalid,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::TokenMissing
            | AuthError::TokenInvalid(_)
            | AuthError::TokenExpired
            | AuthError::KeyResolution(_)
            | AuthError::ApiKeyMissing => StatusCode::UNAUTHORIZED,
            AuthError::ScopeEncodingInvalid
            | AuthError::AuthorizationDenied { .. }
            | AuthError::ApiKeyInvalid => StatusCode::FORBIDDEN,
        }
    }

    /// Message safe to return to the caller. Never includes the reason.
    pub fn client_message(&self) -> &'static str {
        match self.status_code() {
            StatusCode::UNAUTHORIZED => "Authentication required",
            _ => "Forbidden",
        }
    }

    /// Short label used for metrics and structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::TokenMissing => "missing",
            AuthError::TokenInvalid(_) => "invalid",
            AuthError::TokenExpired => "expired",
            AuthError::KeyResolution(_) => "key_resolution",
            AuthError::ScopeEncodingInvalid => "scope_encoding",
            AuthError::AuthorizationDenied { .. } => "denied",
            AuthError::ApiKeyMissing => "api_key_missing",
            AuthError::ApiKeyInvalid => "api_key_invalid",
        }
    }
}

/// Centralized error type for services built on this crate
///
/// Mirrors the usual request-handler failure categories so that handlers can
/// return one error type and have it mapped to the right status code.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("auth missing: {0}")]
    AuthMissing(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    #[error("unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// JSON body written for every error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::AuthMissing(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Permission(_) => StatusCode::FORBIDDEN,
            ServiceError::EntityNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::DuplicateResource(_) => StatusCode::CONFLICT,
            ServiceError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) | ServiceError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Auth(e) => e.status_code(),
        }
    }

    /// Whether the failure is routine client behaviour that should be logged
    /// without detail (401, 403, 404).
    pub fn is_expected(&self) -> bool {
        matches!(
            self.status_code(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        )
    }

    /// Emit the log line for this error. Expected client errors are logged at
    /// debug without detail, everything else at error with the full message.
    pub fn log(&self) {
        let status = self.status_code().as_u16();
        if self.is_expected() {
            tracing::debug!(status, "request rejected");
        } else {
            tracing::error!(status, error = %self, "request failed");
        }
    }

    pub fn body(&self) -> ErrorBody {
        let message = match self {
            ServiceError::Auth(e) => e.client_message().to_string(),
            ServiceError::Internal(_) | ServiceError::Config(_) => {
                "Internal server error".to_string()
            }
            ServiceError::AuthMissing(_) => "Authentication required".to_string(),
            ServiceError::Permission(_) => "Forbidden".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            code: self.status_code().as_u16(),
            message,
        }
    }

    /// Build the HTTP response for this error, logging it on the way.
    pub fn to_http_response(&self) -> Response<Bytes> {
        self.log();

        let status = self.status_code();
        let body = serde_json::to_vec(&self.body()).unwrap_or_default();

        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json");
        if status == StatusCode::UNAUTHORIZED {
            builder = builder.header(header::WWW_AUTHENTICATE, "Bearer");
        }

        builder.body(Bytes::from(body)).unwrap_or_else(|_| {
            let mut response = Response::new(Bytes::new());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
    }
}
