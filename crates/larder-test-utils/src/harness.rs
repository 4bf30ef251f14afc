// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end orchestration tests.
//!
//! `TestHarness` assembles a complete orchestrator over a [`MockBackend`],
//! in-memory stores, and a [`RecordingAlertSink`].

use std::sync::Arc;
use std::time::Duration;

use larder_agent::{
    AgentFactory, FallbackPolicy, InMemoryContextStore, InMemoryProfileStore, Orchestrator,
    agents,
};
use larder_config::AgentConfig;
use larder_core::{AgentResponse, ComplexityLevel, LarderError, ModelBackend, SessionId};
use larder_router::{HybridClient, HybridSettings, ModelConfig, ModelRegistry};

use crate::mock_alerts::RecordingAlertSink;
use crate::mock_backend::MockBackend;

/// Preferred model for simple and standard requests.
pub const SMALL_MODEL: &str = "small";
/// Model for standard and harder requests.
pub const LARGE_MODEL: &str = "large";
/// Session used by [`TestHarness::ask`].
pub const TEST_SESSION: &str = "test-session";

/// The two-model table used unless a test supplies its own.
pub fn default_models() -> Vec<ModelConfig> {
    vec![
        ModelConfig::new(
            SMALL_MODEL,
            &[ComplexityLevel::Simple, ComplexityLevel::Standard],
            1,
        )
        .with_concurrency(2),
        ModelConfig::new(
            LARGE_MODEL,
            &[
                ComplexityLevel::Standard,
                ComplexityLevel::Complex,
                ComplexityLevel::Critical,
            ],
            2,
        )
        .with_concurrency(2),
    ]
}

/// Fallback policy with millisecond backoff so tests stay fast.
pub fn fast_fallback() -> FallbackPolicy {
    FallbackPolicy {
        retry_attempts: 2,
        retry_backoff: Duration::from_millis(5),
        prompt_rewrite: true,
        downgrade: true,
    }
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    backend: Option<Arc<MockBackend>>,
    models: Vec<ModelConfig>,
    default_model: String,
    policy: FallbackPolicy,
    timeout: Duration,
    language: String,
    factory: Option<AgentFactory>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            backend: None,
            models: default_models(),
            default_model: SMALL_MODEL.to_string(),
            policy: fast_fallback(),
            timeout: Duration::from_secs(5),
            language: "en".to_string(),
            factory: None,
        }
    }

    pub fn with_backend(mut self, backend: Arc<MockBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set text replies on a fresh mock backend.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.backend = Some(Arc::new(MockBackend::with_responses(responses)));
        self
    }

    pub fn with_models(mut self, models: Vec<ModelConfig>, default_model: &str) -> Self {
        self.models = models;
        self.default_model = default_model.to_string();
        self
    }

    pub fn with_fallback(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    /// Replace the built-in agents.
    pub fn with_factory(mut self, factory: AgentFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn build(self) -> Result<TestHarness, LarderError> {
        let backend = self.backend.unwrap_or_default();
        let registry = ModelRegistry::new(self.models, self.default_model)?;
        let client = Arc::new(HybridClient::new(
            backend.clone() as Arc<dyn ModelBackend>,
            registry,
            HybridSettings {
                backend_timeout: self.timeout,
                selection_log_capacity: 100,
            },
        ));
        let factory = match self.factory {
            Some(factory) => factory,
            None => agents::builtin_factory(&AgentConfig::default())?,
        };
        let alerts = Arc::new(RecordingAlertSink::new());
        let profiles = Arc::new(InMemoryProfileStore::new(self.language.clone()));
        let contexts = Arc::new(InMemoryContextStore::default());
        let orchestrator = Orchestrator::builder(client.clone(), factory)
            .profiles(profiles.clone())
            .contexts(contexts.clone())
            .alerts(alerts.clone())
            .policy(self.policy)
            .default_language(self.language)
            .build();

        Ok(TestHarness {
            orchestrator: Arc::new(orchestrator),
            client,
            backend,
            alerts,
            profiles,
            contexts,
        })
    }
}

/// A fully wired orchestrator over mocks.
pub struct TestHarness {
    pub orchestrator: Arc<Orchestrator>,
    pub client: Arc<HybridClient>,
    pub backend: Arc<MockBackend>,
    pub alerts: Arc<RecordingAlertSink>,
    pub profiles: Arc<InMemoryProfileStore>,
    pub contexts: Arc<InMemoryContextStore>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Sends `text` through the orchestrator as [`TEST_SESSION`].
    pub async fn ask(&self, text: &str) -> AgentResponse {
        self.orchestrator
            .process_command(text, &SessionId::from(TEST_SESSION))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_answers_with_mock_reply() {
        let harness = TestHarness::builder()
            .with_mock_responses(vec!["Hello from mock".to_string()])
            .build()
            .unwrap();
        let response = harness.ask("hi").await;
        assert!(response.success, "{response:?}");
        assert_eq!(response.text.as_deref(), Some("Hello from mock"));
        assert_eq!(harness.backend.calls_for(SMALL_MODEL), 1);
    }

    #[test]
    fn unknown_default_model_is_rejected() {
        let result = TestHarness::builder()
            .with_models(default_models(), "missing")
            .build();
        assert!(matches!(result, Err(LarderError::Config(_))));
    }
}
