// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded recovery after a failed agent call.
//!
//! The chain is a small FSM:
//! Primary -> Retrying (up to R times) -> Rewriting -> Downgraded -> Terminal.
//! The chain counts backend calls, not states: the rewrite call and its
//! re-run share the rewrite tier, and the downgrade only runs while the
//! budget allows, so a request never makes more than `R + 2` calls after
//! the primary one. A cancelled token or a validation error stops the
//! chain wherever it is.

use std::sync::Arc;
use std::time::Duration;

use larder_config::FallbackConfig;
use larder_core::{AgentInput, AgentResponse, ChatMessage, ComplexityLevel, LarderError};
use larder_router::{recording, CompletionOptions, HybridClient};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::CapabilityAgent;
use crate::handle::{LlmHandle, RoutePlan};

const REWRITE_PROMPT: &str = "Rewrite the user's request as one short, simple question. \
Keep the language of the original. Reply with the rewritten question only.";

/// States of the fallback FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackState {
    /// The first, unassisted attempt.
    Primary,
    /// Re-running on the model the failed attempt used.
    Retrying { attempt: u32 },
    /// Re-running once with a simplified query.
    Rewriting,
    /// Re-running once on the cheapest simple-capable model.
    Downgraded,
    /// Nothing left to try.
    Terminal,
}

impl FallbackState {
    /// Label without the attempt number, for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FallbackState::Primary => "primary",
            FallbackState::Retrying { .. } => "retrying",
            FallbackState::Rewriting => "rewriting",
            FallbackState::Downgraded => "downgraded",
            FallbackState::Terminal => "terminal",
        }
    }
}

impl std::fmt::Display for FallbackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackState::Retrying { attempt } => write!(f, "retrying({attempt})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Which tiers run and how long to wait between retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub retry_attempts: u32,
    /// Base backoff; doubled for every further retry.
    pub retry_backoff: Duration,
    pub prompt_rewrite: bool,
    pub downgrade: bool,
}

impl FallbackPolicy {
    pub fn from_config(config: &FallbackConfig) -> Self {
        Self {
            retry_attempts: config.retry_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            prompt_rewrite: config.prompt_rewrite,
            downgrade: config.downgrade,
        }
    }

    /// Upper bound on backend calls after the primary one.
    pub fn max_attempts(&self) -> u32 {
        self.retry_attempts + 2
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_backoff.saturating_mul(factor)
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::from_config(&FallbackConfig::default())
    }
}

/// How a fallback run ended.
#[derive(Debug)]
pub enum FallbackOutcome {
    /// A tier produced a successful response.
    Recovered {
        response: AgentResponse,
        state: FallbackState,
        attempts: u32,
    },
    /// Every enabled tier failed.
    Exhausted { last_error: LarderError, attempts: u32 },
    /// The chain stopped on an error it must not act on.
    Aborted(LarderError),
}

/// Runs the fallback tiers for one failed agent call.
pub struct FallbackChain<'a> {
    client: &'a Arc<HybridClient>,
    policy: &'a FallbackPolicy,
    cancel: &'a CancellationToken,
    state: FallbackState,
    attempts: u32,
}

impl<'a> FallbackChain<'a> {
    pub fn new(
        client: &'a Arc<HybridClient>,
        policy: &'a FallbackPolicy,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            client,
            policy,
            cancel,
            state: FallbackState::Primary,
            attempts: 0,
        }
    }

    pub fn state(&self) -> FallbackState {
        self.state
    }

    fn transition(&mut self, next: FallbackState, agent: &str) {
        info!(agent, from = %self.state, to = %next, "fallback transition");
        recording::record_fallback_transition(self.state.label(), next.label());
        self.state = next;
    }

    /// Recovers from `error`, raised by the primary attempt on `failed_model`.
    pub async fn recover(
        mut self,
        agent: &dyn CapabilityAgent,
        input: &AgentInput,
        failed_model: Option<String>,
        error: LarderError,
    ) -> FallbackOutcome {
        if !error.is_recoverable() || self.cancel.is_cancelled() {
            return FallbackOutcome::Aborted(error);
        }
        let mut last_error = error;

        let retry_plan = failed_model.map_or(RoutePlan::Auto, RoutePlan::Pinned);
        for attempt in 1..=self.policy.retry_attempts {
            self.transition(FallbackState::Retrying { attempt }, agent.name());
            let delay = self.policy.backoff_for(attempt);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return FallbackOutcome::Aborted(LarderError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            match self.attempt(agent, input, retry_plan.clone()).await {
                Ok(response) => return self.recovered(response),
                Err(err) if !err.is_recoverable() => return FallbackOutcome::Aborted(err),
                Err(err) => {
                    warn!(agent = agent.name(), attempt, error = %err, "retry failed");
                    last_error = err;
                }
            }
        }

        if self.policy.prompt_rewrite && !input.text.trim().is_empty() {
            self.transition(FallbackState::Rewriting, agent.name());
            self.attempts += 1;
            match self.rewrite_query(&input.text).await {
                Ok((rewritten, rewriter)) => {
                    debug!(
                        agent = agent.name(),
                        rewritten = %rewritten,
                        model = %rewriter,
                        "query rewritten"
                    );
                    let input = input.with_text(rewritten);
                    match self.attempt(agent, &input, RoutePlan::Pinned(rewriter)).await {
                        Ok(response) => return self.recovered(response),
                        Err(err) if !err.is_recoverable() => return FallbackOutcome::Aborted(err),
                        Err(err) => {
                            warn!(agent = agent.name(), error = %err, "rewritten query failed");
                            last_error = err;
                        }
                    }
                }
                Err(LarderError::Cancelled) => {
                    return FallbackOutcome::Aborted(LarderError::Cancelled);
                }
                Err(err) => {
                    warn!(agent = agent.name(), error = %err, "query rewrite failed");
                    last_error = err;
                }
            }
        }

        if self.policy.downgrade && self.attempts >= self.policy.max_attempts() {
            debug!(
                agent = agent.name(),
                attempts = self.attempts,
                "call budget spent, skipping downgrade"
            );
        } else if self.policy.downgrade {
            let downgrade = self
                .client
                .registry()
                .downgrade_model()
                .map(|m| m.name.clone());
            match downgrade {
                Some(model) => {
                    self.transition(FallbackState::Downgraded, agent.name());
                    match self.attempt(agent, input, RoutePlan::Pinned(model)).await {
                        Ok(response) => return self.recovered(response),
                        Err(err) if !err.is_recoverable() => return FallbackOutcome::Aborted(err),
                        Err(err) => {
                            warn!(agent = agent.name(), error = %err, "downgraded attempt failed");
                            last_error = err;
                        }
                    }
                }
                None => debug!(agent = agent.name(), "no simple-capable model to downgrade to"),
            }
        }

        self.transition(FallbackState::Terminal, agent.name());
        FallbackOutcome::Exhausted {
            last_error,
            attempts: self.attempts,
        }
    }

    async fn attempt(
        &mut self,
        agent: &dyn CapabilityAgent,
        input: &AgentInput,
        plan: RoutePlan,
    ) -> Result<AgentResponse, LarderError> {
        self.attempts += 1;
        let handle = LlmHandle::new(self.client.clone(), plan, self.cancel.clone());
        agent.process(input, &handle).await
    }

    /// Returns the rewritten query and the model that wrote it.
    async fn rewrite_query(&self, text: &str) -> Result<(String, String), LarderError> {
        let messages = vec![ChatMessage::system(REWRITE_PROMPT), ChatMessage::user(text)];
        let options = CompletionOptions::default()
            .with_level(ComplexityLevel::Simple)
            .with_temperature(0.2);
        let outcome = self.client.complete(messages, options, self.cancel).await?;
        let rewritten = outcome.completion.content.trim().to_string();
        if rewritten.is_empty() {
            return Err(LarderError::Internal("rewrite produced no text".to_string()));
        }
        Ok((rewritten, outcome.decision.model))
    }

    fn recovered(self, response: AgentResponse) -> FallbackOutcome {
        info!(state = %self.state, attempts = self.attempts, "fallback recovered");
        FallbackOutcome::Recovered {
            response: response.with_fallback(true),
            state: self.state,
            attempts: self.attempts,
        }
    }
}

/// The static reply used when every tier failed.
pub fn apology(language: &str) -> &'static str {
    match language.split(['-', '_']).next().unwrap_or_default() {
        "pl" => "Przepraszam, nie udało się przetworzyć zapytania. Spróbuj ponownie później.",
        _ => "Sorry, I couldn't process your request right now. Please try again later.",
    }
}
