// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The model access handle given to agents for one attempt.

use std::sync::{Arc, Mutex, PoisonError};

use larder_core::{ChatMessage, LarderError};
use larder_router::{CompletionOptions, CompletionOutcome, CompletionStream, HybridClient};
use tokio_util::sync::CancellationToken;

/// How model calls made through a handle are routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePlan {
    /// Classify each call and let the selector choose.
    Auto,
    /// Send every call to this model.
    Pinned(String),
}

/// Routed, cancellable access to the hybrid client.
///
/// The handle remembers the last model it reached, successful or not, so
/// the fallback chain can retry against the same model.
pub struct LlmHandle {
    client: Arc<HybridClient>,
    plan: RoutePlan,
    cancel: CancellationToken,
    used_model: Mutex<Option<String>>,
}

impl LlmHandle {
    pub fn new(client: Arc<HybridClient>, plan: RoutePlan, cancel: CancellationToken) -> Self {
        Self {
            client,
            plan,
            cancel,
            used_model: Mutex::new(None),
        }
    }

    pub fn plan(&self) -> &RoutePlan {
        &self.plan
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The last model a call went to.
    pub fn used_model(&self) -> Option<String> {
        self.used_model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remember(&self, model: Option<&str>) {
        if let Some(model) = model {
            *self.used_model.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(model.to_string());
        }
    }

    fn apply_plan(&self, mut options: CompletionOptions) -> CompletionOptions {
        if let RoutePlan::Pinned(model) = &self.plan {
            options.model = Some(model.clone());
        }
        options
    }

    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionOutcome, LarderError> {
        let options = self.apply_plan(options);
        let result = self.client.complete(messages, options, &self.cancel).await;
        match &result {
            Ok(outcome) => self.remember(Some(&outcome.decision.model)),
            Err(err) => self.remember(err.model()),
        }
        result
    }

    pub async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionStream, LarderError> {
        let options = self.apply_plan(options);
        let result = self
            .client
            .stream(messages, options, self.cancel.clone())
            .await;
        match &result {
            Ok(stream) => self.remember(Some(stream.model())),
            Err(err) => self.remember(err.model()),
        }
        result
    }
}
