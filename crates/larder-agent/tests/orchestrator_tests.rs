// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end orchestrator tests over the mock backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use larder_agent::{AgentFactory, CapabilityAgent, LlmHandle, Orchestrator, agents};
use larder_config::AgentConfig;
use larder_core::{
    AgentInput, AgentResponse, ContextStore, ErrorSeverity, LarderError, Profile, ProfileStore,
    SessionId,
};
use larder_test_utils::{LARGE_MODEL, SMALL_MODEL, TEST_SESSION, TestHarness};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn session() -> SessionId {
    SessionId::from(TEST_SESSION)
}

#[tokio::test]
async fn simple_greeting_goes_to_small_model() {
    let harness = TestHarness::builder().build().unwrap();
    let response = harness.ask("hi").await;

    assert!(response.success, "{response:?}");
    assert!(!response.processed_with_fallback);
    assert_eq!(response.text.as_deref(), Some("mock response"));
    assert_eq!(response.metadata["complexity"], json!("simple"));
    assert_eq!(response.metadata["model"], json!(SMALL_MODEL));
    assert_eq!(response.metadata["intent"], json!("general"));
    assert_eq!(response.metadata["agent"], json!("general"));
    assert_eq!(response.metadata["session_id"], json!(TEST_SESSION));
    assert_eq!(harness.backend.models_called(), vec![SMALL_MODEL]);
}

#[tokio::test]
async fn critical_analytical_request_goes_to_large_model() {
    let harness = TestHarness::builder().build().unwrap();
    let response = harness
        .ask("This is urgent: analyze whether my son's nut allergy rules out this granola")
        .await;

    assert!(response.success, "{response:?}");
    assert_eq!(response.metadata["complexity"], json!("critical"));
    assert_eq!(response.metadata["model"], json!(LARGE_MODEL));
}

#[tokio::test]
async fn recipe_intent_uses_recipe_agent() {
    let harness = TestHarness::builder().build().unwrap();
    let response = harness.ask("Przepis na pierogi ruskie").await;

    assert!(response.success);
    assert_eq!(response.metadata["intent"], json!("recipe"));
    assert_eq!(response.metadata["agent"], json!("recipe"));
}

#[tokio::test]
async fn unregistered_intent_falls_back_to_default_agent() {
    let harness = TestHarness::builder().build().unwrap();
    let response = harness.ask("What's the weather tomorrow?").await;

    assert!(response.success, "{response:?}");
    assert_eq!(response.metadata["intent"], json!("weather"));
    assert_eq!(response.metadata["agent"], json!("general"));
}

#[tokio::test]
async fn blank_command_is_rejected_without_model_calls() {
    let harness = TestHarness::builder().build().unwrap();
    let response = harness.ask("   ").await;

    assert!(!response.success);
    assert!(!response.processed_with_fallback);
    assert_eq!(response.error_severity, Some(ErrorSeverity::Low));
    assert_eq!(response.metadata["error_kind"], json!("validation"));
    assert!(response.error.as_deref().unwrap_or_default().contains("empty"));
    assert_eq!(harness.backend.call_count(), 0);
    assert!(harness.alerts.alerts().is_empty());
}

#[tokio::test]
async fn conversation_updates_context_and_profile() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec!["first answer".into(), "second answer".into()])
        .build()
        .unwrap();
    harness.ask("hi").await;
    harness.ask("thanks").await;

    let context = harness.contexts.get_context(&session()).await.unwrap();
    assert_eq!(context.history.len(), 2);
    assert_eq!(context.history[0].user, "hi");
    assert_eq!(context.history[1].assistant, "second answer");
    assert_eq!(context.data["last_agent"], json!("general"));

    let profile = harness.profiles.get_or_create_profile(&session()).await.unwrap();
    assert_eq!(profile.interactions, 2);
    assert_eq!(harness.profiles.activity(&session()).len(), 2);
}

#[tokio::test]
async fn image_upload_is_sent_with_the_picture() {
    let harness = TestHarness::builder().build().unwrap();
    let response = harness
        .orchestrator
        .process_file(vec![0x89, b'P', b'N', b'G'], "receipt.png", &session(), "image/png")
        .await;

    assert!(response.success, "{response:?}");
    assert_eq!(response.metadata["intent"], json!("image_processing"));
    assert_eq!(response.data.as_ref().unwrap()["filename"], json!("receipt.png"));
    let calls = harness.backend.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].has_images);
}

#[tokio::test]
async fn text_document_is_summarised() {
    let harness = TestHarness::builder().build().unwrap();
    let response = harness
        .orchestrator
        .process_file(
            b"mleko 3.49\nchleb 5.20".to_vec(),
            "paragon.txt",
            &session(),
            "application/octet-stream",
        )
        .await;

    assert!(response.success, "{response:?}");
    assert_eq!(response.metadata["intent"], json!("document_processing"));
    assert!(harness.backend.calls()[0].prompt.contains("chleb 5.20"));
}

#[tokio::test]
async fn unsupported_upload_is_rejected() {
    let harness = TestHarness::builder().build().unwrap();
    let response = harness
        .orchestrator
        .process_file(vec![1, 2, 3], "archive.zip", &session(), "application/zip")
        .await;

    assert!(!response.success);
    assert_eq!(response.error_severity, Some(ErrorSeverity::Low));
    assert!(response.error.as_deref().unwrap_or_default().contains("unsupported content type"));
    assert_eq!(harness.backend.call_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_respect_model_limits() {
    let harness = TestHarness::builder().build().unwrap();
    harness.backend.set_delay(Duration::from_millis(30));

    let mut tasks = Vec::new();
    for n in 0..12 {
        let orchestrator = harness.orchestrator.clone();
        tasks.push(tokio::spawn(async move {
            orchestrator
                .process_command("hi", &SessionId::from(format!("s{n}").as_str()))
                .await
        }));
    }
    for task in tasks {
        let response = task.await.unwrap();
        assert!(response.success, "{response:?}");
    }

    assert_eq!(harness.backend.calls_for(SMALL_MODEL), 12);
    assert!(harness.backend.max_in_flight(SMALL_MODEL) <= 2);
    assert_eq!(harness.client.governor().available(SMALL_MODEL), 2);
}

#[tokio::test]
async fn cancelled_request_is_not_retried() {
    let harness = TestHarness::builder().build().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let response = harness
        .orchestrator
        .process_command_with_cancel("hi", &session(), &cancel)
        .await;

    assert!(!response.success);
    assert!(!response.processed_with_fallback);
    assert_eq!(response.error.as_deref(), Some("request cancelled"));
    assert_eq!(harness.backend.call_count(), 0);
    assert!(harness.alerts.alerts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_an_in_flight_call() {
    let harness = TestHarness::builder().build().unwrap();
    harness.backend.push_reply(larder_test_utils::MockReply::Hang);
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
    }
    let response = harness
        .orchestrator
        .process_command_with_cancel("hi", &session(), &cancel)
        .await;

    assert_eq!(response.error.as_deref(), Some("request cancelled"));
    assert_eq!(harness.backend.call_count(), 1);
    assert_eq!(harness.client.governor().available(SMALL_MODEL), 2);
}

struct BrokenProfiles;

#[async_trait]
impl ProfileStore for BrokenProfiles {
    async fn get_or_create_profile(&self, _session_id: &SessionId) -> Result<Profile, LarderError> {
        Err(LarderError::store("profile database unreachable"))
    }

    async fn log_activity(
        &self,
        _session_id: &SessionId,
        _intent_type: &str,
        _command: &str,
    ) -> Result<(), LarderError> {
        Ok(())
    }
}

#[tokio::test]
async fn store_failure_becomes_structured_error() {
    let harness = TestHarness::builder().build().unwrap();
    let orchestrator = Orchestrator::builder(
        harness.client.clone(),
        agents::builtin_factory(&AgentConfig::default()).unwrap(),
    )
    .profiles(Arc::new(BrokenProfiles))
    .default_language("en")
    .build();

    let response = orchestrator.process_command("hi", &session()).await;
    assert!(!response.success);
    assert_eq!(response.error_severity, Some(ErrorSeverity::High));
    assert_eq!(response.metadata["error_kind"], json!("store"));
    assert!(response.error.as_deref().unwrap_or_default().starts_with("Sorry"));
    assert_eq!(harness.backend.call_count(), 0);
}

struct PanickingAgent;

#[async_trait]
impl CapabilityAgent for PanickingAgent {
    fn name(&self) -> &str {
        "general"
    }

    async fn process(
        &self,
        _input: &AgentInput,
        _llm: &LlmHandle,
    ) -> Result<AgentResponse, LarderError> {
        panic!("agent bug");
    }
}

#[tokio::test]
async fn panicking_agent_yields_critical_response() {
    let mut builder = AgentFactory::builder("general");
    builder
        .register("general", |_| Arc::new(PanickingAgent) as Arc<dyn CapabilityAgent>)
        .unwrap();
    let harness = TestHarness::builder()
        .with_factory(builder.build().unwrap())
        .build()
        .unwrap();

    let response = harness.ask("hi").await;
    assert!(!response.success);
    assert_eq!(response.metadata["error_kind"], json!("critical"));
    let alerts = harness.alerts.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, ErrorSeverity::Critical);
    assert_eq!(alerts[0].message, "request handling panicked");
    assert_eq!(alerts[0].context["session_id"], json!(TEST_SESSION));
}

#[tokio::test]
async fn disabled_model_is_skipped_for_new_requests() {
    let harness = TestHarness::builder().build().unwrap();
    harness.client.set_model_enabled(SMALL_MODEL, false).unwrap();
    let response = harness
        .ask("how many eggs do I need for a recipe that serves six people")
        .await;

    assert!(response.success);
    assert_eq!(response.metadata["complexity"], json!("standard"));
    assert_eq!(response.metadata["model"], json!(LARGE_MODEL));
}
