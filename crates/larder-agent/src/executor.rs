// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `safe_process`: validation, the primary attempt, and the fallback
//! chain around every agent call.

use std::sync::Arc;

use larder_core::{AgentInput, AgentResponse, AlertSink, ErrorSeverity, LarderError};
use larder_router::HybridClient;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::capability::{CapabilityAgent, TextStream};
use crate::fallback::{FallbackChain, FallbackOutcome, FallbackPolicy, apology};
use crate::handle::{LlmHandle, RoutePlan};

/// Result of a streaming request.
pub enum StreamOutcome {
    /// Chunks in generation order.
    Streaming(TextStream),
    /// The request finished without streaming: a validation failure, a
    /// non-streaming agent, or a fallback-resolved response.
    Complete(AgentResponse),
}

impl std::fmt::Debug for StreamOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamOutcome::Streaming(_) => f.write_str("Streaming(..)"),
            StreamOutcome::Complete(response) => f.debug_tuple("Complete").field(response).finish(),
        }
    }
}

/// Runs agents with validation, fallback, and alerting.
pub struct AgentExecutor {
    client: Arc<HybridClient>,
    alerts: Arc<dyn AlertSink>,
    policy: FallbackPolicy,
}

impl AgentExecutor {
    pub fn new(client: Arc<HybridClient>, alerts: Arc<dyn AlertSink>, policy: FallbackPolicy) -> Self {
        Self {
            client,
            alerts,
            policy,
        }
    }

    pub fn client(&self) -> &Arc<HybridClient> {
        &self.client
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    /// Runs `agent` on `input` and always returns a response.
    pub async fn safe_process(
        &self,
        agent: &dyn CapabilityAgent,
        input: &AgentInput,
        cancel: &CancellationToken,
    ) -> AgentResponse {
        let started = Instant::now();
        if let Err(err) = agent.validate(input) {
            debug!(agent = agent.name(), error = %err, "input rejected");
            return rejected(err, &input.language).with_processing_time(started.elapsed());
        }

        let handle = LlmHandle::new(self.client.clone(), RoutePlan::Auto, cancel.clone());
        let response = match agent.process(input, &handle).await {
            Ok(response) => response.with_fallback(false),
            Err(err) => {
                self.recover(agent, input, handle.used_model(), err, cancel)
                    .await
            }
        };
        response.with_processing_time(started.elapsed())
    }

    /// Streams `agent`'s answer when it can stream.
    ///
    /// Failures before the first chunk go through the fallback chain and
    /// come back as [`StreamOutcome::Complete`]. Errors after streaming
    /// started are yielded in the stream.
    pub async fn safe_stream(
        &self,
        agent: &dyn CapabilityAgent,
        input: &AgentInput,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        if !agent.supports_streaming() {
            return StreamOutcome::Complete(self.safe_process(agent, input, cancel).await);
        }
        let started = Instant::now();
        if let Err(err) = agent.validate(input) {
            return StreamOutcome::Complete(
                rejected(err, &input.language).with_processing_time(started.elapsed()),
            );
        }

        let handle = LlmHandle::new(self.client.clone(), RoutePlan::Auto, cancel.clone());
        match agent.stream_process(input, &handle).await {
            Ok(stream) => StreamOutcome::Streaming(stream),
            Err(err) => {
                let response = self
                    .recover(agent, input, handle.used_model(), err, cancel)
                    .await;
                StreamOutcome::Complete(response.with_processing_time(started.elapsed()))
            }
        }
    }

    async fn recover(
        &self,
        agent: &dyn CapabilityAgent,
        input: &AgentInput,
        failed_model: Option<String>,
        err: LarderError,
        cancel: &CancellationToken,
    ) -> AgentResponse {
        warn!(
            agent = agent.name(),
            session_id = %input.session_id,
            model = failed_model.as_deref().unwrap_or("none"),
            error = %err,
            "primary attempt failed"
        );
        let chain = FallbackChain::new(&self.client, &self.policy, cancel);
        match chain.recover(agent, input, failed_model, err).await {
            FallbackOutcome::Recovered {
                response,
                state,
                attempts,
            } => response
                .with_metadata("fallback_state", state.to_string())
                .with_metadata("fallback_attempts", attempts),
            FallbackOutcome::Exhausted {
                last_error,
                attempts,
            } => self.exhausted(agent, input, last_error, attempts).await,
            FallbackOutcome::Aborted(err) => rejected(err, &input.language),
        }
    }

    async fn exhausted(
        &self,
        agent: &dyn CapabilityAgent,
        input: &AgentInput,
        last_error: LarderError,
        attempts: u32,
    ) -> AgentResponse {
        error!(
            agent = agent.name(),
            session_id = %input.session_id,
            attempts,
            error = %last_error,
            "fallback chain exhausted"
        );
        let message = format!("agent {} exhausted fallback: {last_error}", agent.name());
        let context = json!({
            "agent": agent.name(),
            "session_id": input.session_id.as_str(),
            "attempts": attempts,
            "error_kind": last_error.kind(),
        });
        self.alert(&message, &context, ErrorSeverity::High).await;

        AgentResponse::failure(apology(&input.language), ErrorSeverity::High)
            .with_metadata("fallback_exhausted", true)
            .with_metadata("fallback_attempts", attempts)
            .with_metadata("error_kind", last_error.kind())
            .with_metadata("error_detail", last_error.to_string())
    }

    /// Sends an alert if the sink accepts it. Sink failures are logged.
    pub async fn alert(&self, message: &str, context: &serde_json::Value, severity: ErrorSeverity) {
        if !self.alerts.should_alert(message, severity) {
            return;
        }
        if let Err(err) = self.alerts.send_alert(message, context, severity).await {
            warn!(error = %err, "alert delivery failed");
        }
    }
}

/// Response for errors the fallback chain must not act on.
///
/// Validation reasons are addressed to the user and shown as they are.
/// Anything else gets the localized apology. The full error text is kept
/// in `error_detail`.
fn rejected(err: LarderError, language: &str) -> AgentResponse {
    let message = match &err {
        LarderError::Validation(reason) => reason.clone(),
        LarderError::Cancelled => "request cancelled".to_string(),
        _ => apology(language).to_string(),
    };
    AgentResponse::failure(message, err.severity())
        .with_metadata("error_kind", err.kind())
        .with_metadata("error_detail", err.to_string())
}
