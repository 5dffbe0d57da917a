//! Admin authentication middleware
//!
//! Guards the key management routes. When no admin key is configured the
//! guard lets everything through.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::services::key_pool::mask_secret;

/// State for the admin guard
#[derive(Clone, Default)]
pub struct AdminAuth {
    admin_key: Option<Arc<str>>,
}

impl AdminAuth {
    pub fn new(admin_key: Option<String>) -> Self {
        Self {
            admin_key: admin_key.map(Arc::from),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.admin_key.is_some()
    }

    fn accepts(&self, presented: &str) -> bool {
        match &self.admin_key {
            Some(expected) => constant_time_eq(expected, presented),
            None => true,
        }
    }
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Require the admin key (`x-api-key` or `Authorization: Bearer`)
pub async fn require_admin_key(
    State(auth): State<AdminAuth>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !auth.is_enabled() {
        return Ok(next.run(request).await);
    }

    let Some(presented) = extract_api_key(&request) else {
        tracing::warn!(path = %request.uri().path(), "Admin request missing API key");
        return Err(ApiError::Unauthorized(
            "Missing API key. Include 'x-api-key' or 'Authorization: Bearer <key>' header in your request."
                .to_string(),
        ));
    };

    if !auth.accepts(&presented) {
        tracing::warn!(key = %mask_secret(&presented), "Invalid admin API key");
        return Err(ApiError::Unauthorized("Invalid API key".to_string()));
    }

    Ok(next.run(request).await)
}

/// Extract an API key from `x-api-key` or `Authorization: Bearer`
pub fn extract_api_key<B>(request: &axum::http::Request<B>) -> Option<String> {
    let headers = request.headers();
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
