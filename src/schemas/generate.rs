//! Generation API schema definitions
//!
//! The public request/response bodies of `/api/generate` and the key
//! management routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::services::key_pool::{CredentialSnapshot, KeyStatistics};

pub const DEFAULT_CONTENT_TYPE: &str = "paragraph";
pub const DEFAULT_TONE: &str = "academic";
pub const DEFAULT_WORD_COUNT: u32 = 250;

/// Tokens budgeted per requested word
const TOKENS_PER_WORD: f64 = 1.3;

// ============================================================================
// Request
// ============================================================================

/// Word count as sent by clients: a JSON number or a numeric string
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WordCount {
    Number(f64),
    Text(String),
}

impl WordCount {
    /// Integer value, leading digits only for strings; 0 when unparseable
    pub fn value(&self) -> u32 {
        match self {
            WordCount::Number(n) if n.is_finite() && *n >= 0.0 => n.trunc().min(u32::MAX as f64) as u32,
            WordCount::Number(_) => 0,
            WordCount::Text(s) => {
                let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            }
        }
    }
}

/// Body of `POST /api/generate`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub topic: Option<String>,

    /// Accepted as an alias for `topic`
    #[serde(default)]
    pub prompt: Option<String>,

    #[serde(default)]
    pub content_type: Option<String>,

    #[serde(default)]
    pub tone: Option<String>,

    #[serde(default)]
    pub word_count: Option<WordCount>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default, alias = "max_tokens")]
    pub max_tokens: Option<u32>,
}

impl GenerateRequest {
    /// Resolve defaults and aliases into validated parameters
    pub fn into_params(self) -> Result<GenerationParams, validator::ValidationErrors> {
        let topic = self
            .topic
            .filter(|t| !t.trim().is_empty())
            .or(self.prompt)
            .unwrap_or_default()
            .trim()
            .to_string();

        let params = GenerationParams {
            topic,
            content_type: non_blank(self.content_type).unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            tone: non_blank(self.tone).unwrap_or_else(|| DEFAULT_TONE.to_string()),
            word_count: self.word_count.map(|w| w.value()).unwrap_or(DEFAULT_WORD_COUNT),
            model: non_blank(self.model),
            max_tokens: self.max_tokens,
        };

        params.validate()?;
        Ok(params)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A generation request after defaults are applied
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct GenerationParams {
    #[validate(length(min = 1, message = "Topic is required"))]
    pub topic: String,

    pub content_type: String,

    pub tone: String,

    #[validate(range(min = 50, max = 2000, message = "Word count must be between 50 and 2000"))]
    pub word_count: u32,

    #[validate(length(min = 1))]
    pub model: Option<String>,

    #[validate(range(min = 1, message = "max_tokens must be positive"))]
    pub max_tokens: Option<u32>,
}

impl GenerationParams {
    pub fn prompt(&self) -> String {
        format!(
            "write a {} about {} around {} words in a {} tone",
            self.content_type, self.topic, self.word_count, self.tone
        )
    }

    /// Explicit `max_tokens`, or an estimate from the word count
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
            .unwrap_or_else(|| (self.word_count as f64 * TOKENS_PER_WORD).ceil() as u32)
    }
}

/// First validation message, for the error envelope
pub fn first_validation_message(errors: &validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {}", field))
            })
        })
        .collect();
    // field_errors is a map; keep the topic message first when present
    messages.sort_by_key(|m| !m.starts_with("Topic"));
    messages
        .into_iter()
        .next()
        .unwrap_or_else(|| "Invalid request".to_string())
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub result: String,
    pub metadata: GenerateMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMetadata {
    pub content_type: String,
    pub tone: String,
    pub word_count: u32,
    pub generated_words: usize,
    pub model: String,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "api_keys")]
    pub api_keys: KeyPoolSummary,
}

/// Compact key pool summary attached to successful generations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPoolSummary {
    pub total: usize,
    pub available: usize,
    pub success_rate: f64,
}

impl From<&KeyStatistics> for KeyPoolSummary {
    fn from(stats: &KeyStatistics) -> Self {
        Self {
            total: stats.total_count,
            available: stats.available_count,
            success_rate: stats.success_rate_rounded(),
        }
    }
}

/// Whitespace-separated word count of generated text
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

// ============================================================================
// Key management
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct KeyStatusResponse {
    pub success: bool,
    pub status: &'static str,
    pub data: KeyStatusData,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyStatusData {
    pub keys: Vec<CredentialSnapshot>,
    pub summary: KeyStatusSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyStatusSummary {
    pub total_keys: usize,
    pub available_keys: usize,
    pub rate_limited_keys: usize,
    pub total_success: u64,
    pub total_failures: u64,
    pub success_rate: f64,
}

impl From<KeyStatistics> for KeyStatusResponse {
    fn from(stats: KeyStatistics) -> Self {
        let summary = KeyStatusSummary {
            total_keys: stats.total_count,
            available_keys: stats.available_count,
            rate_limited_keys: stats.cooldown_count,
            total_success: stats.total_success,
            total_failures: stats.total_failures,
            success_rate: stats.success_rate_rounded(),
        };
        Self {
            success: true,
            status: "ok",
            data: KeyStatusData {
                keys: stats.per_credential,
                summary,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyResetResponse {
    pub success: bool,
    pub message: String,
    pub key_index: usize,
}

/// Body of `POST /api/keys`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddKeyRequest {
    #[validate(length(min = 1, message = "key is required"))]
    pub key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddKeyResponse {
    pub success: bool,
    pub key_index: usize,
    pub masked_key: String,
    pub total_keys: usize,
}

// ============================================================================
// Tests
// ============================================================================
