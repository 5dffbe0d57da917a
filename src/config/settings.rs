//! Application settings and configuration
//!
//! Settings come from environment variables (after an optional `.env`
//! file) with defaults for everything except the API keys.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;

use crate::utils::timeout::TimeoutConfig;

pub const DEFAULT_PRIMARY_MODEL: &str = "deepseek-ai/DeepSeek-V3.2:novita";

pub const DEFAULT_FALLBACK_MODELS: &[&str] = &[
    "gpt2",
    "distilgpt2",
    "EleutherAI/gpt-neo-125M",
    "microsoft/DialoGPT-small",
];

pub const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "https://cactus-pen.onrender.com",
    "https://cactus-pen.vercel.app",
    "http://localhost:5173",
    "http://localhost:3000",
];

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!(
                "Invalid environment: {}. Expected: development, staging, or production",
                s
            ),
        }
    }
}

/// Console log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "compact" | "text" => Ok(LogFormat::Pretty),
            _ => anyhow::bail!("Invalid log format: {}. Expected: json or pretty", s),
        }
    }
}

/// Upstream provider settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamSettings {
    pub router_url: String,
    pub inference_url: String,
    pub primary_model: String,
    pub fallback_models: Vec<String>,
    pub default_max_tokens: u32,
    pub temperature: f32,
    pub router_timeout_secs: u64,
    pub inference_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            router_url: crate::services::upstream::DEFAULT_ROUTER_URL.to_string(),
            inference_url: crate::services::upstream::DEFAULT_INFERENCE_URL.to_string(),
            primary_model: DEFAULT_PRIMARY_MODEL.to_string(),
            fallback_models: DEFAULT_FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            default_max_tokens: 300,
            temperature: 0.7,
            router_timeout_secs: 30,
            inference_timeout_secs: 45,
            connect_timeout_secs: 10,
        }
    }
}

impl UpstreamSettings {
    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig::new()
            .with_router_timeout(Duration::from_secs(self.router_timeout_secs))
            .with_inference_timeout(Duration::from_secs(self.inference_timeout_secs))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
    }
}

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    // App settings
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,
    pub log_format: LogFormat,

    // Server settings
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,

    // Credentials
    #[serde(skip_serializing)]
    pub api_keys: Vec<String>,
    pub credential_prefix: String,

    /// Guards the key management routes when set
    #[serde(skip_serializing)]
    pub admin_api_key: Option<String>,

    pub upstream: UpstreamSettings,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let credential_prefix = or_default("CREDENTIAL_PREFIX", &defaults.credential_prefix);
        let api_keys = parse_credentials(
            get("HF_API_KEYS").as_deref(),
            get("HF_API_KEY").as_deref(),
            &credential_prefix,
        );

        let upstream_defaults = UpstreamSettings::default();
        let upstream = UpstreamSettings {
            router_url: or_default("HF_ROUTER_URL", &upstream_defaults.router_url),
            inference_url: or_default("HF_INFERENCE_URL", &upstream_defaults.inference_url),
            primary_model: or_default("PRIMARY_MODEL", &upstream_defaults.primary_model),
            fallback_models: get("FALLBACK_MODELS")
                .map(|v| split_list(&v))
                .unwrap_or(upstream_defaults.fallback_models),
            default_max_tokens: parse_or("DEFAULT_MAX_TOKENS", get("DEFAULT_MAX_TOKENS"), 300)?,
            temperature: parse_or("TEMPERATURE", get("TEMPERATURE"), 0.7)?,
            router_timeout_secs: parse_or("ROUTER_TIMEOUT_SECS", get("ROUTER_TIMEOUT_SECS"), 30)?,
            inference_timeout_secs: parse_or(
                "INFERENCE_TIMEOUT_SECS",
                get("INFERENCE_TIMEOUT_SECS"),
                45,
            )?,
            connect_timeout_secs: parse_or(
                "CONNECT_TIMEOUT_SECS",
                get("CONNECT_TIMEOUT_SECS"),
                10,
            )?,
        };

        let settings = Self {
            app_name: or_default("APP_NAME", &defaults.app_name),
            app_version: defaults.app_version,
            environment: get("ENVIRONMENT")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            log_level: or_default("LOG_LEVEL", &defaults.log_level),
            log_format: get("LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            host: or_default("HOST", &defaults.host),
            port: or_default("PORT", "3000")
                .parse()
                .context("Invalid PORT value")?,
            cors_allowed_origins: get("CORS_ALLOWED_ORIGINS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.cors_allowed_origins),
            api_keys,
            credential_prefix,
            admin_api_key: get("ADMIN_API_KEY"),
            upstream,
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.upstream.primary_model.trim().is_empty() {
            anyhow::bail!("PRIMARY_MODEL cannot be empty");
        }

        if self.upstream.default_max_tokens == 0 {
            anyhow::bail!("DEFAULT_MAX_TOKENS must be > 0");
        }

        if self.upstream.router_timeout_secs == 0
            || self.upstream.inference_timeout_secs == 0
            || self.upstream.connect_timeout_secs == 0
        {
            anyhow::bail!("Upstream timeouts must be > 0");
        }

        if !(0.0..=2.0).contains(&self.upstream.temperature) {
            anyhow::bail!("TEMPERATURE must be between 0 and 2");
        }

        if self.api_keys.is_empty() {
            tracing::warn!("No Hugging Face API keys configured; generation requests will fail");
        }

        if self.environment == Environment::Production && self.admin_api_key.is_none() {
            tracing::warn!("Running in production without ADMIN_API_KEY; key management is open");
        }

        Ok(())
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Get the server address string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "textgen-proxy".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_allowed_origins: DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
            api_keys: Vec::new(),
            credential_prefix: "hf_".to_string(),
            admin_api_key: None,
            upstream: UpstreamSettings::default(),
        }
    }
}

/// Resolve the configured API keys.
///
/// The list variable wins over the single key. A list value without a comma
/// is one key and is taken as-is. Otherwise entries are trimmed, empties
/// dropped, and entries without `prefix` are skipped with a warning. The
/// single key is taken as-is.
pub fn parse_credentials(list: Option<&str>, single: Option<&str>, prefix: &str) -> Vec<String> {
    if let Some(key) = list.map(str::trim).filter(|l| !l.is_empty() && !l.contains(',')) {
        return vec![key.to_string()];
    }

    if let Some(list) = list {
        let keys: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .filter(|k| {
                let accepted = k.starts_with(prefix);
                if !accepted {
                    tracing::warn!(
                        key = %crate::services::key_pool::mask_secret(k),
                        prefix = %prefix,
                        "Skipping API key without the expected prefix"
                    );
                }
                accepted
            })
            .map(str::to_string)
            .collect();

        if !keys.is_empty() {
            return keys;
        }
    }

    single
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| vec![k.to_string()])
        .unwrap_or_default()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value: {}", key, v)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_settings() {
        let settings = load(&[]).unwrap();
        assert_eq!(settings.app_name, "textgen-proxy");
        assert_eq!(settings.port, 3000);
        assert!(settings.api_keys.is_empty());
        assert_eq!(settings.upstream.primary_model, DEFAULT_PRIMARY_MODEL);
        assert_eq!(settings.upstream.fallback_models.len(), 4);
        assert_eq!(settings.upstream.default_max_tokens, 300);
        assert_eq!(settings.cors_allowed_origins.len(), 4);
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("development".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert!("moon".parse::<Environment>().is_err());
    }

    #[test]
    fn test_key_list_takes_priority() {
        let keys = parse_credentials(Some(" hf_one , hf_two ,,"), Some("hf_single"), "hf_");
        assert_eq!(keys, vec!["hf_one", "hf_two"]);
    }

    #[test]
    fn test_key_list_skips_wrong_prefix() {
        let keys = parse_credentials(Some("hf_good,sk-other,hf_fine"), None, "hf_");
        assert_eq!(keys, vec!["hf_good", "hf_fine"]);
    }

    #[test]
    fn test_single_key_fallback() {
        assert_eq!(parse_credentials(None, Some(" hf_single "), "hf_"), vec!["hf_single"]);
        // prefix applies to lists only
        assert_eq!(parse_credentials(None, Some("custom-key"), "hf_"), vec!["custom-key"]);
        // a list with nothing usable falls through to the single key
        assert_eq!(
            parse_credentials(Some("bad1,bad2"), Some("hf_single"), "hf_"),
            vec!["hf_single"]
        );
        assert!(parse_credentials(None, None, "hf_").is_empty());
    }

    #[test]
    fn test_key_list_without_comma_is_single_key() {
        assert_eq!(
            parse_credentials(Some(" custom-key "), Some("hf_single"), "hf_"),
            vec!["custom-key"]
        );
        assert_eq!(
            parse_credentials(Some("  "), Some("hf_single"), "hf_"),
            vec!["hf_single"]
        );
    }

    #[test]
    fn test_overrides_from_env() {
        let settings = load(&[
            ("PORT", "8080"),
            ("HF_API_KEYS", "hf_aaaaaaaa,hf_bbbbbbbb"),
            ("PRIMARY_MODEL", "meta/llama"),
            ("FALLBACK_MODELS", "gpt2, distilgpt2"),
            ("LOG_FORMAT", "pretty"),
            ("ROUTER_TIMEOUT_SECS", "12"),
            ("ADMIN_API_KEY", "secret-admin"),
        ])
        .unwrap();

        assert_eq!(settings.port, 8080);
        assert_eq!(settings.api_keys.len(), 2);
        assert_eq!(settings.upstream.primary_model, "meta/llama");
        assert_eq!(settings.upstream.fallback_models, vec!["gpt2", "distilgpt2"]);
        assert_eq!(settings.log_format, LogFormat::Pretty);
        assert_eq!(settings.upstream.timeouts().router_timeout, Duration::from_secs(12));
        assert_eq!(settings.admin_api_key.as_deref(), Some("secret-admin"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(load(&[("PORT", "0")]).is_err());
        assert!(load(&[("PORT", "http")]).is_err());
        assert!(load(&[("ROUTER_TIMEOUT_SECS", "0")]).is_err());
        assert!(load(&[("TEMPERATURE", "warm")]).is_err());
    }

    #[test]
    fn test_server_addr() {
        let settings = Settings::default();
        assert_eq!(settings.server_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_secrets_not_serialized() {
        let settings = load(&[("HF_API_KEY", "hf_secret_value"), ("ADMIN_API_KEY", "adm")]).unwrap();
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("hf_secret_value"));
        assert!(!json.contains("\"adm\""));
    }
}
