// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The hybrid LLM client: one entry point that classifies, selects,
//! throttles, and calls.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use futures::StreamExt;
use larder_config::LarderConfig;
use larder_core::{
    BackendRequest, ChatMessage, ChunkStream, ComplexityLevel, Completion, HealthStatus,
    LarderError, ModelBackend, Role,
};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::{ComplexityAssessment, ComplexityClassifier};
use crate::governor::{ConcurrencyGovernor, ModelPermit};
use crate::recording;
use crate::registry::ModelRegistry;
use crate::selector::{self, Selection, SelectionDecision};
use crate::stats::{ModelStats, SelectionMetric, StatsBook};
use crate::stream::CompletionStream;

/// Tunables for [`HybridClient`].
#[derive(Debug, Clone)]
pub struct HybridSettings {
    /// Deadline for each backend call, each slot wait, and each gap
    /// between streamed chunks.
    pub backend_timeout: Duration,
    pub selection_log_capacity: usize,
}

impl HybridSettings {
    pub fn from_config(config: &LarderConfig) -> Self {
        Self {
            backend_timeout: Duration::from_secs(config.routing.backend_timeout_secs),
            selection_log_capacity: config.metrics.selection_log_capacity,
        }
    }
}

impl Default for HybridSettings {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(60),
            selection_log_capacity: 100,
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    /// Use this model verbatim, skipping complexity filtering.
    pub model: Option<String>,
    /// Force a complexity level instead of classifying.
    pub level: Option<ComplexityLevel>,
    /// Prepended as a system message.
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    /// Capped at the model's own `max_tokens`.
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_level(mut self, level: ComplexityLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A finished completion and how it was routed.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub completion: Completion,
    pub decision: SelectionDecision,
    /// `None` for explicit-model calls, which are not classified.
    pub assessment: Option<ComplexityAssessment>,
    pub latency: Duration,
}

/// Operator view of one model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub name: String,
    pub enabled: bool,
    pub description: Option<String>,
    pub levels: Vec<ComplexityLevel>,
    pub priority: u32,
    pub max_tokens: u32,
    pub max_concurrency: usize,
    pub available_slots: usize,
    pub supports_streaming: bool,
    pub supports_embedding: bool,
    pub success_rate: f64,
    pub stats: ModelStats,
}

/// Result of a maintenance pass.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub trimmed_selections: usize,
    pub retained_selections: usize,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub models: Vec<ModelStatus>,
}

/// Selection result before a slot is secured.
struct Routed {
    selection: Selection,
    assessment: Option<ComplexityAssessment>,
    max_tokens: u32,
    supports_streaming: bool,
}

/// Routes chat and embedding calls across the registered models.
///
/// Safe to share behind an `Arc`; every method takes `&self`.
pub struct HybridClient {
    backend: Arc<dyn ModelBackend>,
    registry: ArcSwap<ModelRegistry>,
    governor: ConcurrencyGovernor,
    classifier: ComplexityClassifier,
    stats: Arc<StatsBook>,
    timeout: Duration,
}

impl HybridClient {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        registry: ModelRegistry,
        settings: HybridSettings,
    ) -> Self {
        let governor = ConcurrencyGovernor::new(&registry);
        info!(
            backend = backend.name(),
            models = registry.models().len(),
            default_model = %registry.default_model().name,
            "hybrid client ready"
        );
        Self {
            backend,
            registry: ArcSwap::from_pointee(registry),
            governor,
            classifier: ComplexityClassifier::new(),
            stats: Arc::new(StatsBook::new(settings.selection_log_capacity)),
            timeout: settings.backend_timeout,
        }
    }

    pub fn from_config(
        backend: Arc<dyn ModelBackend>,
        config: &LarderConfig,
    ) -> Result<Self, LarderError> {
        let registry = ModelRegistry::from_config(&config.routing)?;
        Ok(Self::new(backend, registry, HybridSettings::from_config(config)))
    }

    /// Current registry snapshot.
    pub fn registry(&self) -> Arc<ModelRegistry> {
        self.registry.load_full()
    }

    pub fn governor(&self) -> &ConcurrencyGovernor {
        &self.governor
    }

    pub fn backend_timeout(&self) -> Duration {
        self.timeout
    }

    /// Classifies messages without calling anything.
    pub fn assess(&self, messages: &[ChatMessage]) -> ComplexityAssessment {
        self.classifier.assess(messages)
    }

    /// Runs a chat completion on the best model for the request.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
        cancel: &CancellationToken,
    ) -> Result<CompletionOutcome, LarderError> {
        if cancel.is_cancelled() {
            return Err(LarderError::Cancelled);
        }
        let messages = inject_system_prompt(messages, options.system_prompt.as_deref());
        let mut routed = self.route(&messages, &options)?;
        let _permit = self.reserve(&mut routed, cancel).await?;
        let Routed {
            selection,
            assessment,
            max_tokens,
            ..
        } = routed;
        let decision = selection.decision;
        let model = decision.model.clone();

        let request = BackendRequest {
            model: model.clone(),
            messages,
            max_tokens: Some(options.max_tokens.map_or(max_tokens, |m| m.min(max_tokens))),
            temperature: options.temperature,
        };

        self.stats.record_start(&model);
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LarderError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.backend.complete(request)) => {
                result.unwrap_or_else(|_| Err(LarderError::Timeout {
                    model: model.clone(),
                    duration: self.timeout,
                }))
            }
        };
        let latency = started.elapsed();

        match result {
            Ok(completion) => {
                let tokens = completion.token_usage();
                self.stats.record_success(&model, latency, tokens);
                recording::record_request(&model, "success");
                recording::record_latency(&model, latency.as_secs_f64());
                info!(
                    model = %model,
                    reason = %decision.reason,
                    latency_ms = latency.as_millis() as u64,
                    tokens,
                    "completion finished"
                );
                Ok(CompletionOutcome {
                    completion,
                    decision,
                    assessment,
                    latency,
                })
            }
            Err(err) => {
                self.stats.record_failure(&model, &err.to_string());
                recording::record_request(&model, err.kind());
                warn!(model = %model, error = %err, "completion failed");
                Err(err)
            }
        }
    }

    /// Streams a chat completion.
    ///
    /// Models that cannot stream are called once and their answer is
    /// yielded as a single chunk, so callers always get a stream whose
    /// concatenation equals the non-streamed answer.
    pub async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
        cancel: CancellationToken,
    ) -> Result<CompletionStream, LarderError> {
        if cancel.is_cancelled() {
            return Err(LarderError::Cancelled);
        }
        let messages = inject_system_prompt(messages, options.system_prompt.as_deref());
        let mut routed = self.route(&messages, &options)?;
        let permit = self.reserve(&mut routed, &cancel).await?;
        let decision = routed.selection.decision;
        let model = decision.model.clone();

        let request = BackendRequest {
            model: model.clone(),
            messages,
            max_tokens: Some(
                options
                    .max_tokens
                    .map_or(routed.max_tokens, |m| m.min(routed.max_tokens)),
            ),
            temperature: options.temperature,
        };

        self.stats.record_start(&model);
        let inner: ChunkStream = if routed.supports_streaming {
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(LarderError::Cancelled),
                result = tokio::time::timeout(self.timeout, self.backend.stream(request)) => {
                    result.unwrap_or_else(|_| Err(LarderError::Timeout {
                        model: model.clone(),
                        duration: self.timeout,
                    }))
                }
            };
            match opened {
                Ok(inner) => inner,
                Err(err) => {
                    self.stats.record_failure(&model, &err.to_string());
                    recording::record_request(&model, err.kind());
                    warn!(model = %model, error = %err, "stream could not be opened");
                    return Err(err);
                }
            }
        } else {
            debug!(model = %model, "model cannot stream, emitting one chunk");
            let backend = self.backend.clone();
            futures::stream::once(async move {
                backend.complete(request).await.map(|c| c.content)
            })
            .boxed()
        };

        info!(model = %model, reason = %decision.reason, "stream opened");
        Ok(CompletionStream::new(
            inner,
            decision,
            permit,
            cancel,
            self.timeout,
            self.stats.clone(),
        ))
    }

    /// Embeds `text` with `model`, or with the preferred embedding model.
    pub async fn embed(
        &self,
        text: &str,
        model: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, LarderError> {
        let registry = self.registry.load_full();
        let model = match model {
            Some(name) => registry
                .get(name)
                .ok_or_else(|| LarderError::UnknownModel(name.to_string()))?
                .name
                .clone(),
            None => registry
                .embedding_model()
                .ok_or_else(|| LarderError::Config("no enabled embedding model".to_string()))?
                .name
                .clone(),
        };

        let _permit = match self.governor.try_acquire(&model) {
            Ok(permit) => permit,
            Err(LarderError::CapacitySaturated { .. }) => self.wait_for_slot(&model, cancel).await?,
            Err(err) => return Err(err),
        };

        self.stats.record_start(&model);
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LarderError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.backend.embed(&model, text)) => {
                result.unwrap_or_else(|_| Err(LarderError::Timeout {
                    model: model.clone(),
                    duration: self.timeout,
                }))
            }
        };
        let latency = started.elapsed();
        match &result {
            Ok(_) => {
                self.stats
                    .record_success(&model, latency, larder_core::types::estimate_tokens(text));
                recording::record_request(&model, "success");
                recording::record_latency(&model, latency.as_secs_f64());
            }
            Err(err) => {
                self.stats.record_failure(&model, &err.to_string());
                recording::record_request(&model, err.kind());
                warn!(model = %model, error = %err, "embedding failed");
            }
        }
        result
    }

    /// Enables or disables a model for future selections.
    ///
    /// Calls already routed keep the snapshot they started with.
    pub fn set_model_enabled(&self, name: &str, enabled: bool) -> Result<(), LarderError> {
        if self.registry.load().get(name).is_none() {
            return Err(LarderError::UnknownModel(name.to_string()));
        }
        self.registry.rcu(|current| {
            current
                .with_model_enabled(name, enabled)
                .unwrap_or_else(|_| ModelRegistry::clone(current))
        });
        info!(model = name, enabled, "model availability changed");
        Ok(())
    }

    /// Status of every registered model, in preference order.
    pub fn models_status(&self) -> Vec<ModelStatus> {
        let registry = self.registry.load_full();
        registry
            .models()
            .iter()
            .map(|model| {
                let stats = self.stats.model(&model.name);
                ModelStatus {
                    name: model.name.clone(),
                    enabled: model.enabled,
                    description: model.description.clone(),
                    levels: model.supported_levels.iter().copied().collect(),
                    priority: model.priority,
                    max_tokens: model.max_tokens,
                    max_concurrency: model.concurrency_limit,
                    available_slots: self.governor.available(&model.name),
                    supports_streaming: model.supports_streaming,
                    supports_embedding: model.supports_embedding,
                    success_rate: stats.success_rate(),
                    stats,
                }
            })
            .collect()
    }

    /// Recent selections, oldest first.
    pub fn recent_selections(&self) -> Vec<SelectionMetric> {
        self.stats.selections()
    }

    /// Trims the selection log and reports totals.
    pub fn maintenance(&self) -> MaintenanceReport {
        let trimmed = self.stats.trim();
        let (total_requests, total_tokens) = self.stats.totals();
        let report = MaintenanceReport {
            trimmed_selections: trimmed,
            retained_selections: self.stats.selections().len(),
            total_requests,
            total_tokens,
            models: self.models_status(),
        };
        info!(
            trimmed,
            retained = report.retained_selections,
            total_requests,
            total_tokens,
            "maintenance pass complete"
        );
        report
    }

    pub async fn health_check(&self) -> Result<HealthStatus, LarderError> {
        self.backend.health_check().await
    }

    /// Shuts down the backend.
    pub async fn shutdown(&self) -> Result<(), LarderError> {
        info!(backend = self.backend.name(), "shutting down model backend");
        self.backend.shutdown().await
    }

    fn route(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Routed, LarderError> {
        let registry = self.registry.load_full();
        let (selection, assessment) = match options.model.as_deref() {
            Some(name) => {
                if registry.get(name).is_none() {
                    return Err(LarderError::UnknownModel(name.to_string()));
                }
                (selector::explicit(&self.governor, name), None)
            }
            None => {
                let assessment = self.classifier.assess(messages);
                let level = options.level.unwrap_or(assessment.level);
                (
                    selector::select(&registry, &self.governor, level),
                    Some(assessment),
                )
            }
        };

        let decision = &selection.decision;
        let model = registry.get(&decision.model);
        let query_length = assessment.as_ref().map_or_else(
            || last_user_text(messages).chars().count(),
            |a| a.query_length,
        );
        self.stats.record_selection(SelectionMetric {
            query_length,
            score: assessment.as_ref().map(|a| a.score),
            level: decision.level,
            model: decision.model.clone(),
            reason: decision.reason.to_string(),
            timestamp: Utc::now(),
        });
        recording::record_selection(
            &decision
                .level
                .map_or_else(|| "none".to_string(), |l| l.to_string()),
            decision.reason.tag(),
        );
        debug!(
            model = %decision.model,
            level = ?decision.level,
            score = ?assessment.as_ref().map(|a| a.score),
            reason = %decision.reason,
            "model selected"
        );

        Ok(Routed {
            max_tokens: model.map_or(u32::MAX, |m| m.max_tokens),
            supports_streaming: model.is_some_and(|m| m.supports_streaming),
            selection,
            assessment,
        })
    }

    async fn reserve(
        &self,
        routed: &mut Routed,
        cancel: &CancellationToken,
    ) -> Result<ModelPermit, LarderError> {
        match routed.selection.permit.take() {
            Some(permit) => Ok(permit),
            None => {
                let model = routed.selection.decision.model.clone();
                self.wait_for_slot(&model, cancel).await
            }
        }
    }

    async fn wait_for_slot(
        &self,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<ModelPermit, LarderError> {
        tokio::time::timeout(self.timeout, self.governor.acquire(model, cancel))
            .await
            .unwrap_or_else(|_| {
                Err(LarderError::Timeout {
                    model: model.to_string(),
                    duration: self.timeout,
                })
            })
    }
}

fn last_user_text(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

/// Prepends `prompt` as a system message unless an identical one leads.
fn inject_system_prompt(mut messages: Vec<ChatMessage>, prompt: Option<&str>) -> Vec<ChatMessage> {
    let Some(prompt) = prompt.filter(|p| !p.trim().is_empty()) else {
        return messages;
    };
    let already_present = messages
        .first()
        .is_some_and(|m| m.role == Role::System && m.content == prompt);
    if !already_present {
        messages.insert(0, ChatMessage::system(prompt));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_prepended_once() {
        let messages = vec![ChatMessage::user("hi")];
        let messages = inject_system_prompt(messages, Some("be brief"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], ChatMessage::system("be brief"));
        let messages = inject_system_prompt(messages, Some("be brief"));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn blank_system_prompt_is_ignored() {
        let messages = inject_system_prompt(vec![ChatMessage::user("hi")], Some("  "));
        assert_eq!(messages.len(), 1);
        let messages = inject_system_prompt(messages, None);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn options_builder_sets_fields() {
        let options = CompletionOptions::default()
            .with_model("m")
            .with_level(ComplexityLevel::Complex)
            .with_system_prompt("p")
            .with_temperature(0.2);
        assert_eq!(options.model.as_deref(), Some("m"));
        assert_eq!(options.level, Some(ComplexityLevel::Complex));
        assert_eq!(options.system_prompt.as_deref(), Some("p"));
        assert_eq!(options.temperature, Some(0.2));
    }

    #[test]
    fn settings_follow_config() {
        let mut config = LarderConfig::default();
        config.routing.backend_timeout_secs = 7;
        config.metrics.selection_log_capacity = 3;
        let settings = HybridSettings::from_config(&config);
        assert_eq!(settings.backend_timeout, Duration::from_secs(7));
        assert_eq!(settings.selection_log_capacity, 3);
    }
}
