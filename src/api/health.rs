//! Health check endpoints
//!
//! Service banner plus the probes used by load balancers and container
//! orchestrators.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::server::state::AppState;

/// Response for the service banner
#[derive(Serialize)]
pub struct BannerResponse {
    pub status: &'static str,
    pub message: String,
    pub version: String,
    pub api_keys_loaded: usize,
    pub timestamp: DateTime<Utc>,
}

/// Response for the main health check endpoint
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub environment: String,
    pub uptime_seconds: u64,
}

/// Response for readiness probe
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub config_loaded: bool,
    pub keys_configured: usize,
    pub keys_available: usize,
}

/// Response for liveness probe
#[derive(Serialize)]
pub struct LivenessResponse {
    pub alive: bool,
}

/// GET /
pub async fn banner(State(state): State<AppState>) -> Json<BannerResponse> {
    Json(BannerResponse {
        status: "ok",
        message: state.settings.app_name.clone(),
        version: state.settings.app_version.clone(),
        api_keys_loaded: state.key_manager.len(),
        timestamp: Utc::now(),
    })
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: state.settings.app_version.clone(),
        environment: state.settings.environment.to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Readiness probe
///
/// Ready once at least one API key is configured. Keys on cooldown still
/// count; the orchestrator falls back to them.
///
/// GET /ready
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let stats = state.key_manager.statistics();
    let checks = ReadinessChecks {
        config_loaded: true,
        keys_configured: stats.total_count,
        keys_available: stats.available_count,
    };

    let ready = checks.config_loaded && checks.keys_configured > 0;
    let status = if ready {
        StatusCode::OK
    } else {
        tracing::warn!(checks = ?checks, "Service not ready");
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(ReadinessResponse { ready, checks }))
}

/// GET /liveness
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { alive: true })
}
