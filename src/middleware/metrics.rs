//! Prometheus metrics
//!
//! Every `AppState` owns its own registry so tests can build independent
//! routers without colliding on global collectors.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::services::key_pool::KeyStatistics;

pub struct Metrics {
    registry: Registry,

    /// `textgen_generation_requests_total{outcome}`
    pub generation_requests: IntCounterVec,

    /// `textgen_upstream_attempts_total{kind}`
    pub upstream_attempts: IntCounterVec,

    pub credentials_total: IntGauge,
    pub credentials_available: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let generation_requests = IntCounterVec::new(
            Opts::new(
                "textgen_generation_requests_total",
                "Generation requests by final outcome",
            ),
            &["outcome"],
        )?;
        let upstream_attempts = IntCounterVec::new(
            Opts::new(
                "textgen_upstream_attempts_total",
                "Upstream provider attempts by result kind",
            ),
            &["kind"],
        )?;
        let credentials_total = IntGauge::new("textgen_credentials_total", "Configured API keys")?;
        let credentials_available = IntGauge::new(
            "textgen_credentials_available",
            "API keys not currently cooling down",
        )?;

        registry.register(Box::new(generation_requests.clone()))?;
        registry.register(Box::new(upstream_attempts.clone()))?;
        registry.register(Box::new(credentials_total.clone()))?;
        registry.register(Box::new(credentials_available.clone()))?;

        Ok(Self {
            registry,
            generation_requests,
            upstream_attempts,
            credentials_total,
            credentials_available,
        })
    }

    pub fn observe_generation(&self, outcome: &str) {
        self.generation_requests.with_label_values(&[outcome]).inc();
    }

    /// Refresh the key pool gauges from a statistics snapshot
    pub fn update_key_gauges(&self, stats: &KeyStatistics) {
        self.credentials_total.set(stats.total_count as i64);
        self.credentials_available.set(stats.available_count as i64);
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
