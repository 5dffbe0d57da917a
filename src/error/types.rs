//! API error types

use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::{FailureKind, GenerationError, KeyStatistics};

/// Seconds a client should wait after every key reported throttling
pub const RETRY_AFTER_SECS: u64 = 60;

/// Key pool counts attached to generation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyPoolStatus {
    pub total_keys: usize,
    pub available_keys: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limited_keys: Option<usize>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid key index")]
    InvalidKeyIndex,

    #[error("No API keys configured. Please set up Hugging Face API keys.")]
    NoCredentials,

    #[error("All API keys are currently rate limited. Please try again in a minute.")]
    RateLimited { keys_rate_limited: usize },

    #[error("Request timed out. The AI service may be overloaded.")]
    Timeout,

    #[error("Model access error: {0}")]
    ModelAccess(String),

    #[error("All API keys and models failed. This could be due to: 1) Invalid API keys, 2) Rate limits on all keys, 3) Network issues")]
    AllFailed {
        status: KeyPoolStatus,
        last_error: Option<String>,
    },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Map a failed generation run to its HTTP outcome.
    ///
    /// `stats` is taken after the run so the cooldown picture is current.
    /// Only a run that ended on throttling with every key cooling is
    /// reported as a rate limit; keys parked by repeated model or server
    /// failures fall through to the kind of the last failure.
    pub fn from_generation(err: GenerationError, stats: &KeyStatistics) -> Self {
        let last_failure = match err {
            GenerationError::NoCredentials => return ApiError::NoCredentials,
            GenerationError::AllAttemptsExhausted { last_failure, .. } => last_failure,
        };

        let throttled = last_failure
            .as_ref()
            .is_some_and(|f| f.kind == FailureKind::Throttled);
        if throttled && stats.all_cooling() {
            return ApiError::RateLimited {
                keys_rate_limited: stats.cooldown_count,
            };
        }

        match last_failure {
            Some(f) if f.kind == FailureKind::Timeout => ApiError::Timeout,
            Some(f) if f.kind == FailureKind::ModelUnavailable => ApiError::ModelAccess(f.message),
            last => ApiError::AllFailed {
                status: KeyPoolStatus {
                    total_keys: stats.total_count,
                    available_keys: stats.available_count,
                    rate_limited_keys: Some(stats.cooldown_count),
                },
                last_error: last.map(|f| f.message),
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidKeyIndex => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::NoCredentials
            | ApiError::ModelAccess(_)
            | ApiError::AllFailed { .. }
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::Unauthorized(_) => "authentication_error",
            ApiError::InvalidKeyIndex => "invalid_request",
            ApiError::NoCredentials => "api_config",
            ApiError::RateLimited { .. } => "rate_limit",
            ApiError::Timeout => "timeout",
            ApiError::ModelAccess(_) => "model_access",
            ApiError::AllFailed { .. } => "all_failed",
            ApiError::Internal(_) => "generation_failed",
        }
    }

    fn solution(&self) -> Option<&'static str> {
        match self {
            ApiError::NoCredentials => {
                Some("Add HF_API_KEYS environment variable with comma-separated API keys")
            }
            ApiError::Timeout => Some("Try again with a shorter word count or wait a few moments"),
            ApiError::ModelAccess(_) => Some(
                "Your API keys may not have access to the requested model. The system will try alternative models.",
            ),
            ApiError::AllFailed { .. } => {
                Some("Please check your API keys have proper access, or try again later.")
            }
            _ => None,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, error_type = self.error_type(), "Request failed");
        } else {
            tracing::debug!(error = %self, error_type = self.error_type(), "Request rejected");
        }

        let mut body = ErrorResponse {
            success: false,
            message: self.to_string(),
            error_type: self.error_type(),
            solution: self.solution(),
            retry_after: None,
            keys_rate_limited: None,
            api_key_status: None,
            last_error: None,
        };

        match self {
            ApiError::RateLimited { keys_rate_limited } => {
                body.retry_after = Some(RETRY_AFTER_SECS);
                body.keys_rate_limited = Some(keys_rate_limited);
            }
            ApiError::AllFailed { status, last_error } => {
                body.api_key_status = Some(status);
                body.last_error = last_error;
            }
            _ => {}
        }

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
    error_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    solution: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keys_rate_limited: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key_status: Option<KeyPoolStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}
