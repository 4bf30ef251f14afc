// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks constraints serde cannot express: unique model names, a resolvable
//! default model, and non-zero limits.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::LarderConfig;

/// Upper bound on same-model retries; higher values only delay the
/// rewrite and downgrade tiers.
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Validates a deserialized configuration.
///
/// Collects every problem instead of stopping at the first one.
pub fn validate_config(config: &LarderConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ConfigError::Validation { message });

    if config.agent.default_agent_type.trim().is_empty() {
        push("agent.default_agent_type must not be empty".to_string());
    }

    let routing = &config.routing;
    if routing.models.is_empty() {
        push("routing.models must register at least one model".to_string());
    }

    let mut seen = HashSet::new();
    for (i, model) in routing.models.iter().enumerate() {
        if model.name.trim().is_empty() {
            push(format!("routing.models[{i}].name must not be empty"));
            continue;
        }
        if !seen.insert(model.name.as_str()) {
            push(format!(
                "duplicate model name `{}` in [[routing.models]]",
                model.name
            ));
        }
        if model.concurrency_limit == 0 {
            push(format!(
                "routing.models[{i}] `{}`: concurrency_limit must be at least 1",
                model.name
            ));
        }
        if model.max_tokens == 0 {
            push(format!(
                "routing.models[{i}] `{}`: max_tokens must be at least 1",
                model.name
            ));
        }
    }

    if !routing.models.is_empty() && !seen.contains(routing.default_model.as_str()) {
        push(format!(
            "routing.default_model `{}` is not listed in [[routing.models]]",
            routing.default_model
        ));
    }

    if routing.backend_timeout_secs == 0 {
        push("routing.backend_timeout_secs must be at least 1".to_string());
    }

    if config.fallback.retry_attempts > MAX_RETRY_ATTEMPTS {
        push(format!(
            "fallback.retry_attempts must be at most {MAX_RETRY_ATTEMPTS}, got {}",
            config.fallback.retry_attempts
        ));
    }

    if config.metrics.selection_log_capacity == 0 {
        push("metrics.selection_log_capacity must be at least 1".to_string());
    }

    if config.ollama.base_url.trim().is_empty() {
        push("ollama.base_url must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&LarderConfig::default()).is_ok());
    }

    #[test]
    fn duplicate_model_names_fail() {
        let mut config = LarderConfig::default();
        let first = config.routing.models[0].clone();
        config.routing.models.push(first);
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "duplicate model name"));
    }

    #[test]
    fn unknown_default_model_fails() {
        let mut config = LarderConfig::default();
        config.routing.default_model = "missing".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "routing.default_model `missing`"));
    }

    #[test]
    fn zero_concurrency_fails() {
        let mut config = LarderConfig::default();
        config.routing.models[1].concurrency_limit = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "concurrency_limit"));
    }

    #[test]
    fn errors_are_collected_not_short_circuited() {
        let mut config = LarderConfig::default();
        config.routing.backend_timeout_secs = 0;
        config.fallback.retry_attempts = 9;
        config.metrics.selection_log_capacity = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn empty_model_table_fails() {
        let mut config = LarderConfig::default();
        config.routing.models.clear();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "at least one model"));
    }
}
