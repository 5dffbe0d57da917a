//! Hugging Face API schema definitions
//!
//! Request and response bodies for the two upstream endpoints: the
//! OpenAI-compatible chat router and the legacy text-generation inference API.

use serde::{Deserialize, Serialize};

// ============================================================================
// Router (chat completions)
// ============================================================================

/// Chat completion request sent to the router
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterRequest {
    pub model: String,
    pub messages: Vec<RouterMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl RouterRequest {
    /// Single-turn request carrying the prompt as a user message
    pub fn user_prompt(model: &str, prompt: &str, max_tokens: u32, temperature: f32) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![RouterMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterMessage {
    pub role: String,
    pub content: String,
}

/// Chat completion response; only the fields we read are modelled
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouterResponse {
    #[serde(default)]
    pub choices: Vec<RouterChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterChoice {
    #[serde(default)]
    pub message: Option<RouterChoiceMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl RouterResponse {
    /// Trimmed text of the first choice, empty when absent
    pub fn text(&self) -> String {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }
}

// ============================================================================
// Inference API (text generation)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub inputs: String,
    pub parameters: InferenceParameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceParameters {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub return_full_text: bool,
}

impl InferenceRequest {
    pub fn new(prompt: &str, max_tokens: u32, temperature: f32) -> Self {
        Self {
            inputs: prompt.to_string(),
            parameters: InferenceParameters {
                max_new_tokens: max_tokens,
                temperature,
                return_full_text: false,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceOutput {
    #[serde(default)]
    pub generated_text: Option<String>,
}

/// Trimmed text of the first generated output, empty when absent
pub fn inference_text(outputs: &[InferenceOutput]) -> String {
    outputs
        .first()
        .and_then(|o| o.generated_text.as_deref())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Error body shape shared by both endpoints (`{"error": "..."}`)
#[derive(Debug, Clone, Deserialize)]
pub struct HfErrorBody {
    pub error: serde_json::Value,
}

impl HfErrorBody {
    pub fn message(&self) -> String {
        match &self.error {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(map) => map
                .get("message")
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| self.error.to_string()),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_request_shape() {
        let req = RouterRequest::user_prompt("some/model", "hello", 300, 0.7);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "some/model");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["max_tokens"], 300);
    }

    #[test]
    fn test_router_response_text() {
        let resp: RouterResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  Hi there \n"}}]}"#,
        )
        .unwrap();
        assert_eq!(resp.text(), "Hi there");

        let empty: RouterResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(empty.text(), "");

        let no_choices: RouterResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(no_choices.text(), "");
    }

    #[test]
    fn test_inference_request_shape() {
        let req = InferenceRequest::new("prompt", 128, 0.7);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["inputs"], "prompt");
        assert_eq!(json["parameters"]["max_new_tokens"], 128);
        assert_eq!(json["parameters"]["return_full_text"], false);
    }

    #[test]
    fn test_inference_text() {
        let outputs: Vec<InferenceOutput> =
            serde_json::from_str(r#"[{"generated_text":" generated "}]"#).unwrap();
        assert_eq!(inference_text(&outputs), "generated");
        assert_eq!(inference_text(&[]), "");
    }

    #[test]
    fn test_error_body_message() {
        let body: HfErrorBody = serde_json::from_str(r#"{"error":"Model not found"}"#).unwrap();
        assert_eq!(body.message(), "Model not found");

        let body: HfErrorBody =
            serde_json::from_str(r#"{"error":{"message":"quota exceeded","type":"x"}}"#).unwrap();
        assert_eq!(body.message(), "quota exceeded");
    }
}
