// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fallback chain behaviour through the full orchestrator.

use std::time::Duration;

use larder_agent::FallbackPolicy;
use larder_core::ErrorSeverity;
use larder_test_utils::harness::fast_fallback;
use larder_test_utils::{LARGE_MODEL, MockBackend, MockReply, SMALL_MODEL, TestHarness};
use serde_json::json;
use std::sync::Arc;

const CRITICAL_QUERY: &str = "Urgent: explain step by step what to do about a possible allergy";

#[tokio::test]
async fn two_failures_then_success_recovers_on_retry() {
    let harness = TestHarness::builder().build().unwrap();
    harness.backend.fail_next(2);

    let response = harness.ask("hi").await;
    assert!(response.success, "{response:?}");
    assert!(response.processed_with_fallback);
    assert_eq!(response.metadata["fallback_state"], json!("retrying(2)"));
    assert_eq!(
        harness.backend.models_called(),
        vec![SMALL_MODEL, SMALL_MODEL, SMALL_MODEL]
    );
}

#[tokio::test]
async fn retries_stay_on_the_failed_model() {
    let harness = TestHarness::builder().build().unwrap();
    harness.backend.fail_next(1);

    let response = harness.ask(CRITICAL_QUERY).await;
    assert!(response.success);
    assert_eq!(response.metadata["fallback_state"], json!("retrying(1)"));
    assert_eq!(harness.backend.models_called(), vec![LARGE_MODEL, LARGE_MODEL]);
    assert_eq!(response.metadata["selection_reason"], json!("explicit override"));
}

#[tokio::test]
async fn rewritten_query_recovers_when_large_model_is_down() {
    let harness = TestHarness::builder().build().unwrap();
    harness.backend.fail_model(LARGE_MODEL);
    harness
        .backend
        .push_reply(MockReply::Text("is peanut butter safe?".into()));

    let response = harness.ask(CRITICAL_QUERY).await;
    assert!(response.success, "{response:?}");
    assert!(response.processed_with_fallback);
    assert_eq!(response.metadata["fallback_state"], json!("rewriting"));

    let calls = harness.backend.calls();
    // primary + two retries on large, then the rewrite and the re-run on small
    assert_eq!(harness.backend.calls_for(LARGE_MODEL), 3);
    assert_eq!(harness.backend.calls_for(SMALL_MODEL), 2);
    assert_eq!(calls[3].prompt, CRITICAL_QUERY);
    assert_eq!(calls[4].prompt, "is peanut butter safe?");
}

#[tokio::test]
async fn downgrade_recovers_without_rewrite() {
    let harness = TestHarness::builder()
        .with_fallback(FallbackPolicy {
            prompt_rewrite: false,
            ..fast_fallback()
        })
        .build()
        .unwrap();
    harness.backend.fail_model(LARGE_MODEL);

    let response = harness.ask(CRITICAL_QUERY).await;
    assert!(response.success, "{response:?}");
    assert_eq!(response.metadata["fallback_state"], json!("downgraded"));
    assert_eq!(
        harness.backend.models_called(),
        vec![LARGE_MODEL, LARGE_MODEL, LARGE_MODEL, SMALL_MODEL]
    );
}

#[tokio::test]
async fn exhausted_chain_returns_apology_and_alerts_once() {
    let harness = TestHarness::builder()
        .with_backend(Arc::new(MockBackend::failing()))
        .build()
        .unwrap();

    let response = harness.ask("hi").await;
    assert!(!response.success);
    assert!(!response.processed_with_fallback);
    assert_eq!(response.error_severity, Some(ErrorSeverity::High));
    assert!(response.error.as_deref().unwrap_or_default().starts_with("Sorry"));
    assert_eq!(response.metadata["fallback_exhausted"], json!(true));
    assert_eq!(response.metadata["error_kind"], json!("backend"));

    // The primary call plus at most R + 2 more.
    let policy = fast_fallback();
    assert!(harness.backend.call_count() <= 1 + policy.max_attempts() as usize);
    assert_eq!(harness.backend.call_count(), 5);

    let alerts = harness.alerts.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, ErrorSeverity::High);
    assert_eq!(alerts[0].context["agent"], json!("general"));
}

#[tokio::test]
async fn polish_profile_gets_polish_apology() {
    let harness = TestHarness::builder()
        .with_backend(Arc::new(MockBackend::failing()))
        .with_language("pl")
        .build()
        .unwrap();

    let response = harness.ask("cześć").await;
    assert!(response.error.as_deref().unwrap_or_default().starts_with("Przepraszam"));
}

#[tokio::test]
async fn muted_sink_suppresses_alert_but_not_response() {
    let harness = TestHarness::builder()
        .with_backend(Arc::new(MockBackend::failing()))
        .build()
        .unwrap();
    harness.alerts.mute(true);

    let response = harness.ask("hi").await;
    assert!(!response.success);
    assert!(harness.alerts.alerts().is_empty());
}

#[tokio::test]
async fn disabled_tiers_shorten_the_chain() {
    let harness = TestHarness::builder()
        .with_backend(Arc::new(MockBackend::failing()))
        .with_fallback(FallbackPolicy {
            retry_attempts: 0,
            retry_backoff: Duration::ZERO,
            prompt_rewrite: false,
            downgrade: false,
        })
        .build()
        .unwrap();

    let response = harness.ask("hi").await;
    assert!(!response.success);
    assert_eq!(harness.backend.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn backend_timeout_enters_the_fallback_chain() {
    let harness = TestHarness::builder()
        .with_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    harness.backend.push_reply(MockReply::Hang);

    let response = harness.ask("hi").await;
    assert!(response.success, "{response:?}");
    assert!(response.processed_with_fallback);
    assert_eq!(response.metadata["fallback_state"], json!("retrying(1)"));
    assert!(response.processing_time >= Duration::from_secs(2));

    let stats = harness
        .client
        .models_status()
        .into_iter()
        .find(|m| m.name == SMALL_MODEL)
        .unwrap()
        .stats;
    assert_eq!(stats.failed_requests, 1);
    assert!(stats.last_error.unwrap_or_default().contains("timed out"));
}

#[tokio::test]
async fn every_injected_failure_count_terminates_within_bound() {
    let policy = fast_fallback();
    for failures in 0..8 {
        let harness = TestHarness::builder().build().unwrap();
        harness.backend.fail_next(failures);
        let response = harness.ask("hi").await;
        assert!(
            harness.backend.call_count() <= 1 + policy.max_attempts() as usize,
            "{failures} failures led to {} calls",
            harness.backend.call_count()
        );
        // Every call after the first `failures` succeeds, and the chain has
        // room for `max_attempts` calls after the primary one.
        assert_eq!(response.success, failures <= policy.max_attempts() as usize);
    }
}

#[tokio::test]
async fn rewritten_query_stays_on_the_rewriting_model() {
    let harness = TestHarness::builder().build().unwrap();
    harness.backend.fail_model(LARGE_MODEL);
    harness.backend.push_reply(MockReply::Text(
        "Urgent: what to do about a possible allergy".into(),
    ));

    let response = harness.ask(CRITICAL_QUERY).await;
    assert!(response.success, "{response:?}");
    assert_eq!(response.metadata["fallback_state"], json!("rewriting"));
    assert_eq!(
        harness.backend.models_called(),
        vec![LARGE_MODEL, LARGE_MODEL, LARGE_MODEL, SMALL_MODEL, SMALL_MODEL]
    );
}

#[tokio::test]
async fn failed_rerun_after_rewrite_spends_the_downgrade_budget() {
    let harness = TestHarness::builder().build().unwrap();
    harness.backend.fail_model(LARGE_MODEL);
    harness
        .backend
        .push_reply(MockReply::Text("is peanut butter safe?".into()));
    harness
        .backend
        .push_reply(MockReply::Fail("model overloaded".into()));

    let response = harness.ask(CRITICAL_QUERY).await;
    let policy = fast_fallback();
    assert!(!response.success);
    assert_eq!(response.metadata["fallback_exhausted"], json!(true));
    assert_eq!(
        harness.backend.call_count(),
        1 + policy.max_attempts() as usize
    );
    assert_eq!(
        harness.backend.models_called(),
        vec![LARGE_MODEL, LARGE_MODEL, LARGE_MODEL, SMALL_MODEL, SMALL_MODEL]
    );
}
