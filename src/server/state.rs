//! Application state container
//!
//! This module defines the shared application state that is passed
//! to all request handlers via Axum's state extraction.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::middleware::{AdminAuth, Metrics};
use crate::services::upstream::{HuggingFaceClient, HuggingFaceConfig, UpstreamClient};
use crate::services::{GenerationOrchestrator, KeyManager};

/// Shared application state
///
/// Built once at startup and cloned into every handler. The key manager is
/// shared by reference so all requests rotate through the same pool.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,

    pub key_manager: Arc<KeyManager>,

    pub orchestrator: Arc<GenerationOrchestrator>,

    /// Prometheus registry for this instance
    pub metrics: Arc<Metrics>,

    /// Application start time (for uptime calculation)
    pub start_time: Instant,
}

impl AppState {
    /// Create the state with the Hugging Face client as upstream
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let upstream = HuggingFaceClient::new(HuggingFaceConfig {
            router_url: settings.upstream.router_url.clone(),
            inference_url: settings.upstream.inference_url.clone(),
            temperature: settings.upstream.temperature,
            timeouts: settings.upstream.timeouts(),
        })?;

        Self::with_upstream(settings, Arc::new(upstream))
    }

    /// Create the state around any upstream implementation
    pub fn with_upstream(
        settings: Settings,
        upstream: Arc<dyn UpstreamClient>,
    ) -> anyhow::Result<Self> {
        let settings = Arc::new(settings);
        let metrics = Arc::new(Metrics::new()?);

        let key_manager = Arc::new(KeyManager::new(settings.api_keys.clone()));
        metrics.update_key_gauges(&key_manager.statistics());

        let orchestrator = GenerationOrchestrator::new(
            key_manager.clone(),
            upstream,
            settings.upstream.primary_model.clone(),
            settings.upstream.fallback_models.clone(),
            settings.upstream.default_max_tokens,
        )
        .with_metrics(metrics.clone());

        tracing::info!(
            keys = key_manager.len(),
            primary_model = %settings.upstream.primary_model,
            fallback_models = settings.upstream.fallback_models.len(),
            "Application state initialized successfully"
        );

        Ok(Self {
            settings,
            key_manager,
            orchestrator: Arc::new(orchestrator),
            metrics,
            start_time: Instant::now(),
        })
    }

    /// Get the application uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn admin_auth(&self) -> AdminAuth {
        AdminAuth::new(self.settings.admin_api_key.clone())
    }
}
