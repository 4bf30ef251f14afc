// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The model table: what each model can do and how it is ranked.

use std::collections::{BTreeSet, HashSet};

use larder_config::{ModelSpecConfig, RoutingConfig};
use larder_core::{ComplexityLevel, LarderError};
use serde::Serialize;

/// One registered model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelConfig {
    pub name: String,
    pub supported_levels: BTreeSet<ComplexityLevel>,
    pub max_tokens: u32,
    /// Lower value is preferred.
    pub priority: u32,
    pub concurrency_limit: usize,
    pub enabled: bool,
    pub supports_streaming: bool,
    pub supports_embedding: bool,
    pub description: Option<String>,
}

impl ModelConfig {
    /// A streaming-capable chat model with default limits.
    pub fn new(name: impl Into<String>, levels: &[ComplexityLevel], priority: u32) -> Self {
        Self {
            name: name.into(),
            supported_levels: levels.iter().copied().collect(),
            max_tokens: 4_096,
            priority,
            concurrency_limit: 2,
            enabled: true,
            supports_streaming: true,
            supports_embedding: false,
            description: None,
        }
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_streaming(mut self, supports_streaming: bool) -> Self {
        self.supports_streaming = supports_streaming;
        self
    }

    pub fn with_embedding(mut self, supports_embedding: bool) -> Self {
        self.supports_embedding = supports_embedding;
        self
    }

    pub fn supports(&self, level: ComplexityLevel) -> bool {
        self.supported_levels.contains(&level)
    }
}

impl From<&ModelSpecConfig> for ModelConfig {
    fn from(spec: &ModelSpecConfig) -> Self {
        Self {
            name: spec.name.clone(),
            supported_levels: spec.levels.iter().copied().collect(),
            max_tokens: spec.max_tokens,
            priority: spec.priority,
            concurrency_limit: spec.concurrency_limit,
            enabled: spec.enabled,
            supports_streaming: spec.supports_streaming,
            supports_embedding: spec.supports_embedding,
            description: spec.description.clone(),
        }
    }
}

/// An immutable snapshot of the model table.
///
/// Models are kept in preference order: ascending priority, then name.
/// Enabling or disabling a model produces a new snapshot, so a selection
/// in progress always sees one consistent table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRegistry {
    models: Vec<ModelConfig>,
    default_model: String,
}

impl ModelRegistry {
    /// Builds a registry. Fails on duplicate names, zero limits, or a
    /// default model that is not registered.
    pub fn new(
        mut models: Vec<ModelConfig>,
        default_model: impl Into<String>,
    ) -> Result<Self, LarderError> {
        let default_model = default_model.into();
        if models.is_empty() {
            return Err(LarderError::Config(
                "model registry must contain at least one model".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for model in &models {
            if !seen.insert(model.name.as_str()) {
                return Err(LarderError::Config(format!(
                    "model `{}` is registered twice",
                    model.name
                )));
            }
            if model.concurrency_limit == 0 {
                return Err(LarderError::Config(format!(
                    "model `{}` has a concurrency limit of zero",
                    model.name
                )));
            }
        }
        if !seen.contains(default_model.as_str()) {
            return Err(LarderError::Config(format!(
                "default model `{default_model}` is not registered"
            )));
        }

        models.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(Self {
            models,
            default_model,
        })
    }

    pub fn from_config(config: &RoutingConfig) -> Result<Self, LarderError> {
        Self::new(
            config.models.iter().map(ModelConfig::from).collect(),
            config.default_model.clone(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.name == name)
    }

    /// All models in preference order, enabled or not.
    pub fn models(&self) -> &[ModelConfig] {
        &self.models
    }

    /// Enabled models that declare `level`, in preference order.
    pub fn candidates(&self, level: ComplexityLevel) -> impl Iterator<Item = &ModelConfig> {
        self.models
            .iter()
            .filter(move |m| m.enabled && m.supports(level))
    }

    pub fn default_model(&self) -> &ModelConfig {
        self.get(&self.default_model)
            .unwrap_or_else(|| &self.models[0])
    }

    /// The enabled simple-capable model with the lowest priority value.
    pub fn downgrade_model(&self) -> Option<&ModelConfig> {
        self.candidates(ComplexityLevel::Simple).next()
    }

    /// The default model when it can embed, else the preferred enabled
    /// embedding model.
    pub fn embedding_model(&self) -> Option<&ModelConfig> {
        let default = self.default_model();
        if default.enabled && default.supports_embedding {
            return Some(default);
        }
        self.models
            .iter()
            .find(|m| m.enabled && m.supports_embedding)
    }

    /// A new snapshot with `name` enabled or disabled.
    pub fn with_model_enabled(&self, name: &str, enabled: bool) -> Result<Self, LarderError> {
        let mut next = self.clone();
        let model = next
            .models
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or_else(|| LarderError::UnknownModel(name.to_string()))?;
        model.enabled = enabled;
        Ok(next)
    }
}
