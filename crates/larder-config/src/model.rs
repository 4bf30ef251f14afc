// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Larder assistant.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a mistyped key fails
//! at startup instead of being silently ignored.

use larder_core::{ComplexityLevel, ErrorSeverity};
use serde::{Deserialize, Serialize};

/// Top-level Larder configuration.
///
/// Every section is optional and defaults to values that work against a
/// local Ollama instance.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LarderConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    /// Model table and selection settings.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Fallback chain tiers.
    #[serde(default)]
    pub fallback: FallbackConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Ollama backend connection.
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Process identity and agent dispatch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Agent type used when an intent names an unregistered type.
    #[serde(default = "default_agent_type")]
    pub default_agent_type: String,

    /// Language assumed for new profiles.
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Overrides the built-in system prompt of the general agent.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_agent_name() -> String {
    "larder".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_agent_type() -> String {
    "general".to_string()
}

fn default_language() -> String {
    "pl".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            default_agent_type: default_agent_type(),
            default_language: default_language(),
            system_prompt: None,
        }
    }
}

/// Model table plus selection defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Model returned when no enabled model supports the requested level.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Deadline applied to each backend call and slot wait.
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,

    /// Registered models. Names must be unique.
    #[serde(default = "default_models")]
    pub models: Vec<ModelSpecConfig>,
}

fn default_model() -> String {
    "SpeakLeash/bielik-4.5b-v3.0-instruct:Q8_0".to_string()
}

fn default_backend_timeout_secs() -> u64 {
    60
}

fn default_models() -> Vec<ModelSpecConfig> {
    use ComplexityLevel::*;
    vec![
        ModelSpecConfig {
            name: "SpeakLeash/bielik-4.5b-v3.0-instruct:Q8_0".to_string(),
            levels: vec![Simple, Standard, Complex, Critical],
            max_tokens: 32_768,
            priority: 1,
            concurrency_limit: 3,
            enabled: true,
            supports_streaming: true,
            supports_embedding: true,
            description: Some("Small Polish instruct model for everyday requests".to_string()),
        },
        ModelSpecConfig {
            name: "gemma3:12b".to_string(),
            levels: vec![Standard, Complex, Critical],
            max_tokens: 8_192,
            priority: 2,
            concurrency_limit: 5,
            enabled: true,
            supports_streaming: true,
            supports_embedding: false,
            description: Some("Multimodal model for receipts and longer analysis".to_string()),
        },
        ModelSpecConfig {
            name: "SpeakLeash/bielik-11b-v2.3-instruct:Q5_K_M".to_string(),
            levels: vec![Complex, Critical],
            max_tokens: 32_768,
            priority: 3,
            concurrency_limit: 2,
            enabled: true,
            supports_streaming: true,
            supports_embedding: false,
            description: Some("Large Polish model for demanding reasoning".to_string()),
        },
        ModelSpecConfig {
            name: "nomic-embed-text".to_string(),
            levels: Vec::new(),
            max_tokens: 8_192,
            priority: 4,
            concurrency_limit: 10,
            enabled: true,
            supports_streaming: false,
            supports_embedding: true,
            description: Some("Embedding model".to_string()),
        },
    ]
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            backend_timeout_secs: default_backend_timeout_secs(),
            models: default_models(),
        }
    }
}

/// One `[[routing.models]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpecConfig {
    pub name: String,

    /// Complexity levels this model may serve. An empty list makes the model
    /// reachable only as the default or through an explicit override.
    #[serde(default)]
    pub levels: Vec<ComplexityLevel>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Lower value is preferred.
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Maximum simultaneous in-flight calls to this model.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub supports_streaming: bool,

    #[serde(default)]
    pub supports_embedding: bool,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_max_tokens() -> u32 {
    4_096
}

fn default_priority() -> u32 {
    10
}

fn default_concurrency_limit() -> usize {
    2
}

fn default_true() -> bool {
    true
}

/// Fallback chain tiers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackConfig {
    /// Retries against the originally selected model.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff; attempt `n` waits `base * 2^n`.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Whether to try a simplified rewrite of the query.
    #[serde(default = "default_true")]
    pub prompt_rewrite: bool,

    /// Whether to try the cheapest simple-capable model.
    #[serde(default = "default_true")]
    pub downgrade: bool,
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            prompt_rewrite: true,
            downgrade: true,
        }
    }
}

/// Operator alert settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlertConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Alerts below this severity are dropped.
    #[serde(default = "default_min_severity")]
    pub min_severity: ErrorSeverity,

    /// Identical alerts are suppressed within this window.
    #[serde(default = "default_throttle_secs")]
    pub throttle_secs: u64,
}

fn default_min_severity() -> ErrorSeverity {
    ErrorSeverity::High
}

fn default_throttle_secs() -> u64 {
    3_600
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_severity: default_min_severity(),
            throttle_secs: default_throttle_secs(),
        }
    }
}

/// Selection log and statistics settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// How many recent model selections are retained.
    #[serde(default = "default_selection_log_capacity")]
    pub selection_log_capacity: usize,
}

fn default_selection_log_capacity() -> usize {
    100
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            selection_log_capacity: default_selection_log_capacity(),
        }
    }
}

/// Connection to the Ollama HTTP API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    /// Transport-level timeout for a single HTTP request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_registered() {
        let config = LarderConfig::default();
        assert!(
            config
                .routing
                .models
                .iter()
                .any(|m| m.name == config.routing.default_model)
        );
    }

    #[test]
    fn model_entry_defaults_apply() {
        let toml_str = r#"
[[routing.models]]
name = "tiny"
levels = ["simple"]
"#;
        let config: LarderConfig = toml::from_str(toml_str).unwrap();
        let model = &config.routing.models[0];
        assert_eq!(model.name, "tiny");
        assert_eq!(model.levels, vec![ComplexityLevel::Simple]);
        assert_eq!(model.priority, 10);
        assert_eq!(model.concurrency_limit, 2);
        assert!(model.enabled);
        assert!(model.supports_streaming);
        assert!(!model.supports_embedding);
    }

    #[test]
    fn model_entry_rejects_unknown_fields() {
        let toml_str = r#"
[[routing.models]]
name = "tiny"
levles = ["simple"]
"#;
        assert!(toml::from_str::<LarderConfig>(toml_str).is_err());
    }

    #[test]
    fn fallback_defaults() {
        let config = LarderConfig::default();
        assert_eq!(config.fallback.retry_attempts, 2);
        assert_eq!(config.fallback.retry_backoff_ms, 500);
        assert!(config.fallback.prompt_rewrite);
        assert!(config.fallback.downgrade);
        assert_eq!(config.alerts.min_severity, ErrorSeverity::High);
        assert_eq!(config.alerts.throttle_secs, 3_600);
        assert_eq!(config.metrics.selection_log_capacity, 100);
    }
}
