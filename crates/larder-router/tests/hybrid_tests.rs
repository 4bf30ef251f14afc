// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HybridClient behaviour over the scripted mock backend.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use larder_core::{ChatMessage, ComplexityLevel, LarderError, ModelBackend};
use larder_router::{
    CompletionOptions, HybridClient, HybridSettings, ModelConfig, ModelRegistry, SelectionReason,
};
use larder_test_utils::harness::default_models;
use larder_test_utils::{CallKind, LARGE_MODEL, MockBackend, MockReply, SMALL_MODEL};
use tokio_util::sync::CancellationToken;

const STANDARD_QUERY: &str = "how many eggs do I need for a recipe that serves six people";
const CRITICAL_QUERY: &str = "Urgent: explain step by step what to do about a possible allergy";

fn client_with(
    backend: &Arc<MockBackend>,
    models: Vec<ModelConfig>,
    default_model: &str,
    timeout: Duration,
) -> HybridClient {
    HybridClient::new(
        backend.clone() as Arc<dyn ModelBackend>,
        ModelRegistry::new(models, default_model).unwrap(),
        HybridSettings {
            backend_timeout: timeout,
            selection_log_capacity: 4,
        },
    )
}

fn client(backend: &Arc<MockBackend>) -> HybridClient {
    client_with(backend, default_models(), SMALL_MODEL, Duration::from_secs(5))
}

fn ask(text: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(text)]
}

#[tokio::test]
async fn simple_request_is_routed_to_small_model() {
    let backend = Arc::new(MockBackend::new());
    let client = client(&backend);

    let outcome = client
        .complete(ask("hi"), CompletionOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.decision.model, SMALL_MODEL);
    assert_eq!(outcome.decision.level, Some(ComplexityLevel::Simple));
    assert_eq!(
        outcome.decision.reason,
        SelectionReason::ComplexityMatch { skipped: vec![] }
    );
    assert_eq!(outcome.assessment.unwrap().level, ComplexityLevel::Simple);
    assert_eq!(outcome.completion.content, "mock response");
    assert_eq!(client.governor().available(SMALL_MODEL), 2);
}

#[tokio::test]
async fn critical_request_is_routed_to_large_model() {
    let backend = Arc::new(MockBackend::new());
    let client = client(&backend);

    let outcome = client
        .complete(ask(CRITICAL_QUERY), CompletionOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.decision.model, LARGE_MODEL);
    assert_eq!(outcome.decision.level, Some(ComplexityLevel::Critical));
}

#[tokio::test]
async fn forced_level_skips_classification_result() {
    let backend = Arc::new(MockBackend::new());
    let client = client(&backend);

    let options = CompletionOptions::default().with_level(ComplexityLevel::Complex);
    let outcome = client
        .complete(ask("hi"), options, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.decision.model, LARGE_MODEL);
    assert_eq!(outcome.decision.level, Some(ComplexityLevel::Complex));
}

#[tokio::test]
async fn explicit_model_bypasses_complexity() {
    let backend = Arc::new(MockBackend::new());
    let client = client(&backend);

    let options = CompletionOptions::default().with_model(LARGE_MODEL);
    let outcome = client
        .complete(ask("hi"), options, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.decision.model, LARGE_MODEL);
    assert_eq!(outcome.decision.reason, SelectionReason::ExplicitOverride);
    assert!(outcome.assessment.is_none());
}

#[tokio::test]
async fn unknown_explicit_model_fails_without_backend_call() {
    let backend = Arc::new(MockBackend::new());
    let client = client(&backend);

    let err = client
        .complete(
            ask("hi"),
            CompletionOptions::default().with_model("gpt-none"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LarderError::UnknownModel(ref name) if name == "gpt-none"));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn cancelled_token_stops_before_selection() {
    let backend = Arc::new(MockBackend::new());
    let client = client(&backend);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .complete(ask("hi"), CompletionOptions::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, LarderError::Cancelled));
    assert_eq!(backend.call_count(), 0);
    assert!(client.recent_selections().is_empty());
}

#[tokio::test]
async fn saturated_model_is_skipped_for_next_candidate() {
    let backend = Arc::new(MockBackend::new());
    backend.pause_streams(true);
    let models = vec![
        ModelConfig::new(SMALL_MODEL, &[ComplexityLevel::Simple, ComplexityLevel::Standard], 1)
            .with_concurrency(1),
        ModelConfig::new(LARGE_MODEL, &[ComplexityLevel::Standard, ComplexityLevel::Critical], 2),
    ];
    let client = client_with(&backend, models, SMALL_MODEL, Duration::from_secs(5));

    let held = client
        .stream(ask(STANDARD_QUERY), CompletionOptions::default(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(held.model(), SMALL_MODEL);
    assert_eq!(client.governor().available(SMALL_MODEL), 0);

    let outcome = client
        .complete(ask(STANDARD_QUERY), CompletionOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.decision.model, LARGE_MODEL);
    assert_eq!(
        outcome.decision.reason.to_string(),
        "complexity match (skipped saturated: small)"
    );

    drop(held);
    assert_eq!(client.governor().available(SMALL_MODEL), 1);
}

#[tokio::test]
async fn default_model_answers_levels_nobody_supports() {
    let backend = Arc::new(MockBackend::new());
    let models = vec![
        ModelConfig::new("general", &[], 1),
        ModelConfig::new(LARGE_MODEL, &[ComplexityLevel::Critical], 2),
    ];
    let client = client_with(&backend, models, "general", Duration::from_secs(5));

    let outcome = client
        .complete(ask("hi"), CompletionOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.decision.model, "general");
    assert_eq!(
        outcome.decision.reason.to_string(),
        "fallback: no model supports level"
    );

    client.set_model_enabled(LARGE_MODEL, false).unwrap();
    let outcome = client
        .complete(ask(CRITICAL_QUERY), CompletionOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.decision.model, "general");
    assert_eq!(outcome.decision.reason, SelectionReason::Fallback);
}

#[tokio::test]
async fn disabling_and_enabling_models_changes_routing() {
    let backend = Arc::new(MockBackend::new());
    let client = client(&backend);

    client.set_model_enabled(SMALL_MODEL, false).unwrap();
    let outcome = client
        .complete(ask(STANDARD_QUERY), CompletionOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.decision.model, LARGE_MODEL);
    assert!(!client.registry().get(SMALL_MODEL).unwrap().enabled);

    client.set_model_enabled(SMALL_MODEL, true).unwrap();
    let outcome = client
        .complete(ask(STANDARD_QUERY), CompletionOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.decision.model, SMALL_MODEL);

    assert!(matches!(
        client.set_model_enabled("missing", false),
        Err(LarderError::UnknownModel(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn hung_backend_times_out_and_frees_slot() {
    let backend = Arc::new(MockBackend::new());
    backend.push_reply(MockReply::Hang);
    let client = client_with(&backend, default_models(), SMALL_MODEL, Duration::from_secs(1));

    let err = client
        .complete(ask("hi"), CompletionOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LarderError::Timeout { ref model, .. } if model == SMALL_MODEL));
    assert!(err.is_recoverable());
    assert_eq!(client.governor().available(SMALL_MODEL), 2);

    let status = client
        .models_status()
        .into_iter()
        .find(|m| m.name == SMALL_MODEL)
        .unwrap();
    assert_eq!(status.stats.failed_requests, 1);
    assert_eq!(status.success_rate, 0.0);
}

#[tokio::test(start_paused = true)]
async fn silent_stream_ends_with_timeout() {
    let backend = Arc::new(MockBackend::new());
    backend.pause_streams(true);
    let client = client_with(&backend, default_models(), SMALL_MODEL, Duration::from_secs(1));

    let mut stream = client
        .stream(ask("hi"), CompletionOptions::default(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), "mock ");
    assert!(matches!(
        stream.next().await,
        Some(Err(LarderError::Timeout { .. }))
    ));
    assert!(stream.next().await.is_none());
    assert_eq!(client.governor().available(SMALL_MODEL), 2);
}

#[tokio::test]
async fn cancelled_stream_aborts_generation_without_polling() {
    let backend = Arc::new(MockBackend::new());
    backend.pause_streams(true);
    let client = client(&backend);
    let cancel = CancellationToken::new();

    let mut stream = client
        .stream(ask("hi"), CompletionOptions::default(), cancel.clone())
        .await
        .unwrap();
    stream.next().await.unwrap().unwrap();
    assert_eq!(client.governor().available(SMALL_MODEL), 1);
    assert_eq!(backend.in_flight(SMALL_MODEL), 1);

    cancel.cancel();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(client.governor().available(SMALL_MODEL), 2);
    assert_eq!(backend.in_flight(SMALL_MODEL), 0);
    assert!(matches!(stream.next().await, Some(Err(LarderError::Cancelled))));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn streamed_chunks_concatenate_to_completion() {
    let backend = Arc::new(MockBackend::new());
    backend.set_default_reply("Add the potatoes once the water boils.");
    let client = client(&backend);

    let completion = client
        .complete(ask("hi"), CompletionOptions::default(), &CancellationToken::new())
        .await
        .unwrap()
        .completion
        .content;
    let stream = client
        .stream(ask("hi"), CompletionOptions::default(), CancellationToken::new())
        .await
        .unwrap();
    let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;

    assert!(chunks.len() > 1);
    assert_eq!(chunks.concat(), completion);
}

#[tokio::test]
async fn non_streaming_model_yields_one_chunk() {
    let backend = Arc::new(MockBackend::new());
    backend.set_default_reply("one two three");
    let models = vec![
        ModelConfig::new(SMALL_MODEL, &[ComplexityLevel::Simple], 1).with_streaming(false),
    ];
    let client = client_with(&backend, models, SMALL_MODEL, Duration::from_secs(5));

    let stream = client
        .stream(ask("hi"), CompletionOptions::default(), CancellationToken::new())
        .await
        .unwrap();
    let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;

    assert_eq!(chunks, vec!["one two three".to_string()]);
    assert_eq!(backend.calls()[0].kind, CallKind::Complete);
}

#[tokio::test]
async fn embeddings_use_embedding_capable_model() {
    let backend = Arc::new(MockBackend::new());
    let models = vec![
        ModelConfig::new(SMALL_MODEL, &[ComplexityLevel::Simple], 1),
        ModelConfig::new("embedder", &[], 5).with_embedding(true),
    ];
    let client = client_with(&backend, models, SMALL_MODEL, Duration::from_secs(5));
    let cancel = CancellationToken::new();

    let vector = client.embed("mleko", None, &cancel).await.unwrap();
    assert_eq!(vector.len(), 8);
    assert_eq!(backend.calls_for("embedder"), 1);

    let explicit = client.embed("mleko", Some(SMALL_MODEL), &cancel).await.unwrap();
    assert_eq!(explicit, vector);

    assert!(matches!(
        client.embed("mleko", Some("missing"), &cancel).await,
        Err(LarderError::UnknownModel(_))
    ));
}

#[tokio::test]
async fn embedding_without_capable_model_is_config_error() {
    let backend = Arc::new(MockBackend::new());
    let client = client(&backend);

    let err = client
        .embed("mleko", None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LarderError::Config(_)));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn status_and_maintenance_report_usage() {
    let backend = Arc::new(MockBackend::new());
    let client = client(&backend);
    let cancel = CancellationToken::new();

    for _ in 0..6 {
        client
            .complete(ask("hi"), CompletionOptions::default(), &cancel)
            .await
            .unwrap();
    }
    client
        .complete(ask(CRITICAL_QUERY), CompletionOptions::default(), &cancel)
        .await
        .unwrap();

    let status = client.models_status();
    assert_eq!(status.len(), 2);
    assert_eq!(status[0].name, SMALL_MODEL);
    assert_eq!(status[0].stats.total_requests, 6);
    assert_eq!(status[0].stats.successful_requests, 6);
    assert_eq!(status[0].success_rate, 1.0);
    assert_eq!(status[0].available_slots, 2);
    assert_eq!(status[1].stats.total_requests, 1);

    // The selection log keeps only the newest entries.
    let selections = client.recent_selections();
    assert_eq!(selections.len(), 4);
    assert_eq!(selections.last().unwrap().model, LARGE_MODEL);

    let report = client.maintenance();
    assert_eq!(report.total_requests, 7);
    assert_eq!(report.total_tokens, 7 * 30);
    assert_eq!(report.retained_selections, 4);
    assert_eq!(report.models.len(), 2);
}
