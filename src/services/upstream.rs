//! Upstream provider client
//!
//! The orchestrator only sees the `UpstreamClient` trait. `HuggingFaceClient`
//! is the production implementation: chat models go to the OpenAI-compatible
//! router, legacy text models go to the inference API.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::schemas::huggingface::{
    inference_text, HfErrorBody, InferenceOutput, InferenceRequest, RouterRequest, RouterResponse,
};
use crate::services::failure::UpstreamFailure;
use crate::utils::timeout::{with_timeout, TimeoutConfig, TimeoutError};
use crate::utils::{body_preview, truncate_str};

// ============================================================================
// Constants
// ============================================================================

pub const DEFAULT_ROUTER_URL: &str = "https://router.huggingface.co/v1/chat/completions";
pub const DEFAULT_INFERENCE_URL: &str = "https://api-inference.huggingface.co/models";

/// Model name fragments served by the legacy inference endpoint
const LEGACY_MODEL_MARKERS: &[&str] = &["gpt2", "gpt-neo", "DialoGPT"];

// ============================================================================
// Trait
// ============================================================================

/// One text-generation request to the provider
#[derive(Debug, Clone, Copy)]
pub struct UpstreamRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub api_key: &'a str,
    pub max_tokens: u32,
}

/// A text-generation provider.
///
/// Returns the generated text (possibly empty) or a classifiable failure.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn generate(&self, request: UpstreamRequest<'_>) -> Result<String, UpstreamFailure>;
}

// ============================================================================
// Hugging Face Client
// ============================================================================

/// Which endpoint a model is served from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Router,
    Inference,
}

impl Endpoint {
    pub fn for_model(model: &str) -> Self {
        if LEGACY_MODEL_MARKERS.iter().any(|m| model.contains(m)) {
            Endpoint::Inference
        } else {
            Endpoint::Router
        }
    }
}

#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    pub router_url: String,
    pub inference_url: String,
    pub temperature: f32,
    pub timeouts: TimeoutConfig,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            router_url: DEFAULT_ROUTER_URL.to_string(),
            inference_url: DEFAULT_INFERENCE_URL.to_string(),
            temperature: 0.7,
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// reqwest-backed client for the Hugging Face router and inference API
#[derive(Debug, Clone)]
pub struct HuggingFaceClient {
    client: Client,
    config: HuggingFaceConfig,
}

impl HuggingFaceClient {
    pub fn new(config: HuggingFaceConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeouts.connect_timeout)
            .pool_max_idle_per_host(10)
            .build()?;

        tracing::info!(
            router_url = %config.router_url,
            inference_url = %config.inference_url,
            router_timeout_secs = config.timeouts.router_timeout.as_secs(),
            inference_timeout_secs = config.timeouts.inference_timeout.as_secs(),
            "Initialized Hugging Face client"
        );

        Ok(Self { client, config })
    }

    fn headers(api_key: &str) -> Result<HeaderMap, UpstreamFailure> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| UpstreamFailure::status(401, format!("Invalid API key format: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    async fn post_json<B, R>(&self, url: &str, api_key: &str, body: &B) -> Result<R, UpstreamFailure>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .headers(Self::headers(api_key)?)
            .json(body)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_failure)?;

        if !status.is_success() {
            let message = serde_json::from_str::<HfErrorBody>(&text)
                .map(|b| b.message())
                .unwrap_or_else(|_| body_preview(&text, 500));
            return Err(UpstreamFailure::status(status.as_u16(), message));
        }

        serde_json::from_str(&text).map_err(|e| {
            tracing::debug!(error = %e, body = %truncate_str(&text, 500), "Unparseable upstream body");
            UpstreamFailure::Malformed(e.to_string())
        })
    }

    async fn call_router(&self, request: UpstreamRequest<'_>) -> Result<String, UpstreamFailure> {
        let body = RouterRequest::user_prompt(
            request.model,
            request.prompt,
            request.max_tokens,
            self.config.temperature,
        );
        let response: RouterResponse = self
            .post_json(&self.config.router_url, request.api_key, &body)
            .await?;
        Ok(response.text())
    }

    async fn call_inference(&self, request: UpstreamRequest<'_>) -> Result<String, UpstreamFailure> {
        let url = format!(
            "{}/{}",
            self.config.inference_url.trim_end_matches('/'),
            request.model
        );
        let body = InferenceRequest::new(request.prompt, request.max_tokens, self.config.temperature);
        let outputs: Vec<InferenceOutput> = self.post_json(&url, request.api_key, &body).await?;
        Ok(inference_text(&outputs))
    }
}

#[async_trait]
impl UpstreamClient for HuggingFaceClient {
    async fn generate(&self, request: UpstreamRequest<'_>) -> Result<String, UpstreamFailure> {
        let endpoint = Endpoint::for_model(request.model);
        let deadline = match endpoint {
            Endpoint::Router => self.config.timeouts.router_timeout,
            Endpoint::Inference => self.config.timeouts.inference_timeout,
        };

        tracing::debug!(
            model = %request.model,
            endpoint = ?endpoint,
            max_tokens = request.max_tokens,
            "Calling upstream provider"
        );

        let call = async {
            match endpoint {
                Endpoint::Router => self.call_router(request).await,
                Endpoint::Inference => self.call_inference(request).await,
            }
        };

        with_timeout(deadline, call).await.map_err(|e| match e {
            TimeoutError::Timeout(d) => UpstreamFailure::Timeout(secs_ceil(d)),
            TimeoutError::Inner(failure) => failure,
        })
    }
}

fn transport_failure(err: reqwest::Error) -> UpstreamFailure {
    if err.is_timeout() {
        UpstreamFailure::Timeout(0)
    } else if err.is_decode() {
        UpstreamFailure::Malformed(err.to_string())
    } else {
        UpstreamFailure::Transport(err.to_string())
    }
}

fn secs_ceil(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::failure::FailureKind;

    fn client_for(server: &mockito::Server) -> HuggingFaceClient {
        HuggingFaceClient::new(HuggingFaceConfig {
            router_url: format!("{}/v1/chat/completions", server.url()),
            inference_url: format!("{}/models", server.url()),
            ..Default::default()
        })
        .unwrap()
    }

    fn request<'a>(model: &'a str) -> UpstreamRequest<'a> {
        UpstreamRequest {
            prompt: "write a paragraph about cacti",
            model,
            api_key: "hf_test_key_123",
            max_tokens: 64,
        }
    }

    #[test]
    fn test_endpoint_selection() {
        assert_eq!(Endpoint::for_model("gpt2"), Endpoint::Inference);
        assert_eq!(Endpoint::for_model("distilgpt2"), Endpoint::Inference);
        assert_eq!(Endpoint::for_model("EleutherAI/gpt-neo-125M"), Endpoint::Inference);
        assert_eq!(Endpoint::for_model("microsoft/DialoGPT-small"), Endpoint::Inference);
        assert_eq!(
            Endpoint::for_model("deepseek-ai/DeepSeek-V3.2:novita"),
            Endpoint::Router
        );
    }

    #[tokio::test]
    async fn test_router_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer hf_test_key_123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":" A cactus stores water. "}}]}"#)
            .create_async()
            .await;

        let text = client_for(&server)
            .generate(request("deepseek-ai/DeepSeek-V3.2:novita"))
            .await
            .unwrap();

        assert_eq!(text, "A cactus stores water.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_inference_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gpt2")
            .with_status(200)
            .with_body(r#"[{"generated_text":"Cacti are succulents."}]"#)
            .create_async()
            .await;

        let text = client_for(&server).generate(request("gpt2")).await.unwrap();

        assert_eq!(text, "Cacti are succulents.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_failures_classify() {
        let mut server = mockito::Server::new_async().await;
        let _m429 = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":"Rate limit reached"}"#)
            .create_async()
            .await;
        let _m404 = server
            .mock("POST", "/models/gpt2")
            .with_status(404)
            .with_body("Not Found")
            .create_async()
            .await;

        let client = client_for(&server);

        let err = client.generate(request("some/chat-model")).await.unwrap_err();
        assert_eq!(err, UpstreamFailure::status(429, "Rate limit reached"));
        assert_eq!(err.kind(), FailureKind::Throttled);

        let err = client.generate(request("gpt2")).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ModelUnavailable);
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client_for(&server)
            .generate(request("some/chat-model"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamFailure::Malformed(_)));
    }

    #[test]
    fn test_secs_ceil() {
        assert_eq!(secs_ceil(Duration::from_secs(30)), 30);
        assert_eq!(secs_ceil(Duration::from_millis(1500)), 2);
    }
}
