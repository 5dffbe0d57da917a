//! Key management endpoints
//!
//! Admin surface over the key pool: status, cooldown reset and adding a
//! key at runtime. Guarded by the admin key when one is configured.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use validator::Validate;

use crate::error::ApiError;
use crate::schemas::generate::{
    first_validation_message, AddKeyRequest, AddKeyResponse, KeyResetResponse, KeyStatusResponse,
};
use crate::server::state::AppState;
use crate::services::key_pool::mask_secret;

/// GET /api/keys/status
pub async fn key_status(State(state): State<AppState>) -> Json<KeyStatusResponse> {
    let stats = state.key_manager.statistics();
    state.metrics.update_key_gauges(&stats);
    Json(KeyStatusResponse::from(stats))
}

/// POST /api/keys/:index/reset
///
/// The index arrives as a raw string so that negative or non-numeric input
/// gets the same 400 as an out-of-range index.
pub async fn reset_key(
    State(state): State<AppState>,
    Path(raw_index): Path<String>,
) -> Result<Json<KeyResetResponse>, ApiError> {
    let index: usize = raw_index.trim().parse().map_err(|_| ApiError::InvalidKeyIndex)?;

    if !state.key_manager.reset_cooldown(index) {
        return Err(ApiError::InvalidKeyIndex);
    }
    state.metrics.update_key_gauges(&state.key_manager.statistics());

    Ok(Json(KeyResetResponse {
        success: true,
        message: format!("Rate limit reset for key {}", index),
        key_index: index,
    }))
}

/// POST /api/keys
pub async fn add_key(
    State(state): State<AppState>,
    payload: Result<Json<AddKeyRequest>, JsonRejection>,
) -> Result<Json<AddKeyResponse>, ApiError> {
    let Json(request) = payload?;
    request
        .validate()
        .map_err(|errors| ApiError::Validation(first_validation_message(&errors)))?;

    let secret = request.key.trim();
    let prefix = &state.settings.credential_prefix;
    if !secret.starts_with(prefix.as_str()) {
        return Err(ApiError::Validation(format!(
            "API key must start with '{}'",
            prefix
        )));
    }

    let key_index = state.key_manager.add_credential(secret);
    state.metrics.update_key_gauges(&state.key_manager.statistics());

    Ok(Json(AddKeyResponse {
        success: true,
        key_index,
        masked_key: mask_secret(secret),
        total_keys: state.key_manager.len(),
    }))
}
