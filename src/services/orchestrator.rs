//! Generation orchestration
//!
//! Walks (credential, model) combinations until one produces text or the
//! attempt budget runs out. The budget is `credentials × models`, so every
//! combination gets one chance in the common case.

use std::sync::Arc;
use thiserror::Error;

use super::failure::{FailureKind, UpstreamFailure, EMPTY_RESPONSE};
use super::key_pool::KeyManager;
use super::upstream::{UpstreamClient, UpstreamRequest};
use crate::middleware::metrics::Metrics;

// ============================================================================
// Results
// ============================================================================

/// A successful generation
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub key_index: usize,
    pub attempts: u32,
}

/// The last failed attempt of an exhausted run
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub model: String,
    pub key_index: usize,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("No API keys configured")]
    NoCredentials,

    #[error("All {attempts} attempts failed across {credentials} keys and {models} models")]
    AllAttemptsExhausted {
        attempts: u32,
        credentials: usize,
        models: usize,
        last_failure: Option<AttemptFailure>,
    },
}

impl GenerationError {
    /// Kind of the final failed attempt, if any attempt was made
    pub fn last_kind(&self) -> Option<FailureKind> {
        match self {
            GenerationError::NoCredentials => None,
            GenerationError::AllAttemptsExhausted { last_failure, .. } => {
                last_failure.as_ref().map(|f| f.kind)
            }
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Sequences upstream attempts over keys and fallback models
pub struct GenerationOrchestrator {
    key_manager: Arc<KeyManager>,
    upstream: Arc<dyn UpstreamClient>,
    primary_model: String,
    fallback_models: Vec<String>,
    default_max_tokens: u32,
    metrics: Option<Arc<Metrics>>,
}

impl GenerationOrchestrator {
    pub fn new(
        key_manager: Arc<KeyManager>,
        upstream: Arc<dyn UpstreamClient>,
        primary_model: impl Into<String>,
        fallback_models: Vec<String>,
        default_max_tokens: u32,
    ) -> Self {
        Self {
            key_manager,
            upstream,
            primary_model: primary_model.into(),
            fallback_models,
            default_max_tokens,
            metrics: None,
        }
    }

    /// Count every upstream attempt by outcome
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.key_manager
    }

    pub fn primary_model(&self) -> &str {
        &self.primary_model
    }

    /// Ordered model list for a request: requested (or primary) first
    pub fn model_list(&self, requested_model: Option<&str>) -> Vec<String> {
        let first = requested_model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.primary_model);

        std::iter::once(first.to_string())
            .chain(self.fallback_models.iter().cloned())
            .collect()
    }

    pub async fn generate(
        &self,
        prompt: &str,
        requested_model: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Result<Generation, GenerationError> {
        let models = self.model_list(requested_model);
        let credentials = self.key_manager.len();
        if credentials == 0 {
            tracing::error!("Generation requested but no API keys are configured");
            return Err(GenerationError::NoCredentials);
        }

        let max_tokens = max_tokens.unwrap_or(self.default_max_tokens);
        let max_attempts = (credentials * models.len()) as u32;
        let mut attempts: u32 = 0;
        let mut last_failure: Option<AttemptFailure> = None;

        tracing::info!(
            credentials,
            models = models.len(),
            max_attempts,
            max_tokens,
            "Starting generation"
        );

        while attempts < max_attempts {
            let Some(selected) = self.key_manager.select_next() else {
                return Err(GenerationError::NoCredentials);
            };
            if selected.still_cooling {
                tracing::warn!(
                    key_index = selected.index,
                    key = %selected.masked(),
                    "Using a credential that is still cooling down"
                );
            }

            for model in &models {
                if attempts >= max_attempts {
                    break;
                }
                attempts += 1;

                tracing::debug!(
                    attempt = attempts,
                    max_attempts,
                    key_index = selected.index,
                    model = %model,
                    "Upstream attempt"
                );

                let outcome = self
                    .upstream
                    .generate(UpstreamRequest {
                        prompt,
                        model,
                        api_key: &selected.secret,
                        max_tokens,
                    })
                    .await;

                let (kind, message) = match outcome {
                    Ok(text) if !text.trim().is_empty() => {
                        self.key_manager.record_success(selected.index);
                        self.observe_attempt("success");
                        tracing::info!(
                            key_index = selected.index,
                            model = %model,
                            attempts,
                            "Generation succeeded"
                        );
                        return Ok(Generation {
                            text,
                            model: model.clone(),
                            key_index: selected.index,
                            attempts,
                        });
                    }
                    Ok(_) => (FailureKind::Unknown, EMPTY_RESPONSE.to_string()),
                    Err(failure) => (failure.kind(), describe(&failure)),
                };

                self.key_manager
                    .record_classified_failure(selected.index, &message, kind);
                self.observe_attempt(kind.as_str());

                tracing::warn!(
                    attempt = attempts,
                    key_index = selected.index,
                    model = %model,
                    kind = %kind,
                    error = %message,
                    "Upstream attempt failed"
                );

                last_failure = Some(AttemptFailure {
                    model: model.clone(),
                    key_index: selected.index,
                    kind,
                    message,
                });

                if kind.abandons_credential() {
                    break;
                }
            }
        }

        tracing::error!(
            attempts,
            credentials,
            models = models.len(),
            last_kind = ?last_failure.as_ref().map(|f| f.kind),
            "All generation attempts exhausted"
        );

        Err(GenerationError::AllAttemptsExhausted {
            attempts,
            credentials,
            models: models.len(),
            last_failure,
        })
    }

    fn observe_attempt(&self, kind: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.upstream_attempts.with_label_values(&[kind]).inc();
        }
    }
}

fn describe(failure: &UpstreamFailure) -> String {
    match failure {
        UpstreamFailure::Status { status, message } if message.is_empty() => {
            format!("HTTP {}", status)
        }
        UpstreamFailure::Status { status, message } => format!("{} {}", status, message),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    type Script = dyn Fn(&str, &str) -> Result<String, UpstreamFailure> + Send + Sync;

    /// Upstream whose answer depends on (api key, model); records every call
    struct ScriptedUpstream {
        script: Box<Script>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedUpstream {
        fn new(
            script: impl Fn(&str, &str) -> Result<String, UpstreamFailure> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Box::new(script),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl UpstreamClient for ScriptedUpstream {
        async fn generate(&self, request: UpstreamRequest<'_>) -> Result<String, UpstreamFailure> {
            self.calls
                .lock()
                .push((request.api_key.to_string(), request.model.to_string()));
            (self.script)(request.api_key, request.model)
        }
    }

    fn orchestrator(
        keys: &[&str],
        upstream: Arc<ScriptedUpstream>,
        fallbacks: &[&str],
    ) -> GenerationOrchestrator {
        let manager = Arc::new(KeyManager::new(keys.iter().map(|k| k.to_string()).collect()));
        GenerationOrchestrator::new(
            manager,
            upstream,
            "primary/model",
            fallbacks.iter().map(|m| m.to_string()).collect(),
            300,
        )
    }

    #[test]
    fn test_model_list_order() {
        let orch = orchestrator(&["hf_a"], ScriptedUpstream::new(|_, _| Ok("x".into())), &["B", "C"]);
        assert_eq!(orch.model_list(None), vec!["primary/model", "B", "C"]);
        assert_eq!(orch.model_list(Some("A")), vec!["A", "B", "C"]);
        assert_eq!(orch.model_list(Some("  ")), vec!["primary/model", "B", "C"]);
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let upstream = ScriptedUpstream::new(|_, _| Ok("Hello world".into()));
        let orch = orchestrator(&["hf_key_one"], upstream.clone(), &["B"]);

        let generation = orch.generate("prompt", None, None).await.unwrap();
        assert_eq!(generation.text, "Hello world");
        assert_eq!(generation.model, "primary/model");
        assert_eq!(generation.attempts, 1);
        assert_eq!(upstream.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_model_falls_back() {
        let upstream = ScriptedUpstream::new(|_, model| match model {
            "A" => Err(UpstreamFailure::status(404, "Model A not found")),
            _ => Ok("from B".into()),
        });
        let orch = orchestrator(&["hf_only_key"], upstream.clone(), &["B"]);

        let generation = orch.generate("prompt", Some("A"), None).await.unwrap();
        assert_eq!(generation.text, "from B");
        assert_eq!(generation.model, "B");
        assert_eq!(generation.attempts, 2);

        let stats = orch.key_manager().statistics();
        assert_eq!(stats.per_credential[0].success_count, 1);
        assert_eq!(stats.per_credential[0].failure_count, 1);
    }

    #[tokio::test]
    async fn test_all_throttled_exhausts_budget() {
        let upstream = ScriptedUpstream::new(|_, _| Err(UpstreamFailure::status(429, "Too Many Requests")));
        let orch = orchestrator(&["hf_key_one", "hf_key_two"], upstream.clone(), &["B"]);
        let before = Utc::now();

        let err = orch.generate("prompt", None, None).await.unwrap_err();
        match &err {
            GenerationError::AllAttemptsExhausted {
                attempts,
                credentials,
                models,
                last_failure,
            } => {
                assert_eq!(*attempts, 4);
                assert_eq!(*credentials, 2);
                assert_eq!(*models, 2);
                assert_eq!(last_failure.as_ref().unwrap().kind, FailureKind::Throttled);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(upstream.calls().len(), 4);

        let after = Utc::now();
        let stats = orch.key_manager().statistics();
        assert!(stats.all_cooling());
        for cred in &stats.per_credential {
            let until = cred.rate_limit_until.unwrap();
            assert!(until >= before + Duration::seconds(60));
            assert!(until <= after + Duration::seconds(60));
        }
    }

    #[tokio::test]
    async fn test_throttle_skips_remaining_models_for_key() {
        let upstream = ScriptedUpstream::new(|key, _| match key {
            "hf_key_one" => Err(UpstreamFailure::status(429, "quota exceeded")),
            _ => Ok("second key".into()),
        });
        let orch = orchestrator(&["hf_key_one", "hf_key_two"], upstream.clone(), &["B"]);

        let generation = orch.generate("prompt", None, None).await.unwrap();
        assert_eq!(generation.key_index, 1);
        assert_eq!(generation.model, "primary/model");
        assert_eq!(
            upstream.calls(),
            vec![
                ("hf_key_one".to_string(), "primary/model".to_string()),
                ("hf_key_two".to_string(), "primary/model".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_credentials_makes_no_calls() {
        let upstream = ScriptedUpstream::new(|_, _| Ok("unused".into()));
        let orch = orchestrator(&[], upstream.clone(), &["B"]);

        let err = orch.generate("prompt", None, None).await.unwrap_err();
        assert_eq!(err, GenerationError::NoCredentials);
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_moves_to_next_credential() {
        let upstream = ScriptedUpstream::new(|key, _| match key {
            "hf_bad_key" => Err(UpstreamFailure::status(401, "Invalid credentials")),
            _ => Ok("ok".into()),
        });
        let orch = orchestrator(&["hf_bad_key", "hf_good_key"], upstream.clone(), &["B"]);

        let generation = orch.generate("prompt", Some("A"), None).await.unwrap();
        assert_eq!(generation.key_index, 1);
        assert_eq!(generation.model, "A");

        let bad_calls: Vec<String> = upstream
            .calls()
            .into_iter()
            .filter(|(key, _)| key == "hf_bad_key")
            .map(|(_, model)| model)
            .collect();
        assert_eq!(bad_calls, vec!["A"]);
    }

    #[tokio::test]
    async fn test_unauthorized_single_key_exhausts() {
        let upstream = ScriptedUpstream::new(|_, _| Err(UpstreamFailure::status(401, "Unauthorized")));
        let orch = orchestrator(&["hf_bad_key"], upstream.clone(), &["B"]);

        let err = orch.generate("prompt", Some("A"), None).await.unwrap_err();
        assert_eq!(err.last_kind(), Some(FailureKind::Unauthorized));

        // budget is 2; the key is retried for A rather than trying B with it
        let models: Vec<String> = upstream.calls().into_iter().map(|(_, m)| m).collect();
        assert_eq!(models, vec!["A", "A"]);
    }

    #[tokio::test]
    async fn test_empty_text_counts_as_failure() {
        let upstream = ScriptedUpstream::new(|_, model| match model {
            "primary/model" => Ok("   ".into()),
            _ => Ok("fallback text".into()),
        });
        let orch = orchestrator(&["hf_only_key"], upstream, &["B"]);

        let generation = orch.generate("prompt", None, None).await.unwrap();
        assert_eq!(generation.model, "B");

        let stats = orch.key_manager().statistics();
        assert_eq!(stats.per_credential[0].failure_count, 1);
        // success clears the last error
        assert!(stats.per_credential[0].last_error.is_none());
    }

    #[tokio::test]
    async fn test_timeout_tries_next_model_then_reports() {
        let upstream = ScriptedUpstream::new(|_, _| Err(UpstreamFailure::Timeout(30)));
        let orch = orchestrator(&["hf_only_key"], upstream.clone(), &["B", "C"]);

        let err = orch.generate("prompt", None, None).await.unwrap_err();
        assert_eq!(err.last_kind(), Some(FailureKind::Timeout));
        let models: Vec<String> = upstream.calls().into_iter().map(|(_, m)| m).collect();
        assert_eq!(models, vec!["primary/model", "B", "C"]);
    }

    #[tokio::test]
    async fn test_explicit_max_tokens_is_forwarded() {
        struct TokenEcho(Mutex<HashMap<String, u32>>);

        #[async_trait]
        impl UpstreamClient for TokenEcho {
            async fn generate(&self, request: UpstreamRequest<'_>) -> Result<String, UpstreamFailure> {
                self.0
                    .lock()
                    .insert(request.model.to_string(), request.max_tokens);
                Ok("text".into())
            }
        }

        let echo = Arc::new(TokenEcho(Mutex::new(HashMap::new())));
        let manager = Arc::new(KeyManager::new(vec!["hf_key".into()]));
        let orch = GenerationOrchestrator::new(manager, echo.clone(), "m", vec![], 300);

        orch.generate("prompt", None, Some(42)).await.unwrap();
        assert_eq!(echo.0.lock().get("m"), Some(&42));

        orch.generate("prompt", None, None).await.unwrap();
        assert_eq!(echo.0.lock().get("m"), Some(&300));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_rotation() {
        let upstream = ScriptedUpstream::new(|_, _| Ok("text".into()));
        let orch = orchestrator(&["hf_key_a", "hf_key_b", "hf_key_c"], upstream, &[]);

        let results = futures::future::join_all((0..9).map(|_| orch.generate("prompt", None, None))).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let stats = orch.key_manager().statistics();
        assert_eq!(stats.total_success, 9);
        for cred in &stats.per_credential {
            assert_eq!(cred.success_count, 3);
        }
    }

    #[test]
    fn test_describe_keeps_status_for_classification() {
        let failure = UpstreamFailure::status(429, "slow down");
        assert_eq!(describe(&failure), "429 slow down");
        assert_eq!(describe(&UpstreamFailure::status(503, "")), "HTTP 503");
    }
}
