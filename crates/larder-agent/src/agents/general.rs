// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversational agent used for general, recipe, and shopping intents.

use async_trait::async_trait;
use futures::StreamExt;
use larder_core::{AgentInput, AgentResponse, ChatMessage, ContextDelta, LarderError};
use larder_router::CompletionOptions;
use serde_json::json;

use crate::capability::{AgentSettings, CapabilityAgent, TextStream};
use crate::handle::LlmHandle;

/// Previous turns replayed to the model.
const HISTORY_TURNS: usize = 4;

pub const GENERAL_PROMPT: &str = "You are Larder, a friendly kitchen and pantry assistant. \
Answer briefly and practically. Reply in the user's language.";

pub const RECIPE_PROMPT: &str = "You are Larder, a home cooking assistant. \
Suggest recipes with an ingredient list and numbered steps. Prefer ingredients the user \
already mentioned. Reply in the user's language.";

pub const SHOPPING_PROMPT: &str = "You are Larder, a shopping list assistant. \
Turn the request into a concise shopping list grouped by store section. \
Reply in the user's language.";

/// A prompt-driven chat agent.
#[derive(Debug, Clone)]
pub struct ChatAgent {
    name: String,
    system_prompt: String,
    temperature: Option<f32>,
}

impl ChatAgent {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            temperature: None,
        }
    }

    /// Applies settings over a built-in prompt.
    ///
    /// Recognised options: `temperature` (number).
    pub fn from_settings(name: &str, builtin_prompt: &str, settings: &AgentSettings) -> Self {
        let prompt = settings.system_prompt.as_deref().unwrap_or(builtin_prompt);
        Self {
            temperature: settings
                .options
                .get("temperature")
                .and_then(|t| t.as_f64())
                .map(|t| t as f32),
            ..Self::new(name, prompt)
        }
    }

    fn system_prompt_for(&self, input: &AgentInput) -> String {
        match &input.personalization {
            Some(hint) => format!("{}\n{hint}", self.system_prompt),
            None => self.system_prompt.clone(),
        }
    }

    fn messages(&self, input: &AgentInput) -> Vec<ChatMessage> {
        let history = &input.context.history;
        let mut messages: Vec<ChatMessage> = history
            [history.len().saturating_sub(HISTORY_TURNS)..]
            .iter()
            .flat_map(|turn| {
                [
                    ChatMessage::user(turn.user.clone()),
                    ChatMessage::assistant(turn.assistant.clone()),
                ]
            })
            .collect();
        messages.push(ChatMessage::user(input.text.clone()));
        messages
    }

    fn options(&self, input: &AgentInput) -> CompletionOptions {
        CompletionOptions {
            system_prompt: Some(self.system_prompt_for(input)),
            temperature: self.temperature,
            ..Default::default()
        }
    }
}

#[async_trait]
impl CapabilityAgent for ChatAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(
        &self,
        input: &AgentInput,
        llm: &LlmHandle,
    ) -> Result<AgentResponse, LarderError> {
        let outcome = llm
            .complete(self.messages(input), self.options(input))
            .await?;
        let mut delta = ContextDelta::default();
        delta.set.insert("last_agent".to_string(), json!(self.name));

        let mut response = AgentResponse::text(outcome.completion.content)
            .with_metadata("model", outcome.decision.model.clone())
            .with_metadata("selection_reason", outcome.decision.reason.to_string())
            .with_context_update(delta);
        if let Some(assessment) = outcome.assessment {
            response = response
                .with_metadata("complexity", assessment.level.to_string())
                .with_metadata("complexity_score", f64::from(assessment.score));
        }
        Ok(response)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn stream_process(
        &self,
        input: &AgentInput,
        llm: &LlmHandle,
    ) -> Result<TextStream, LarderError> {
        let stream = llm.stream(self.messages(input), self.options(input)).await?;
        Ok(stream.boxed())
    }
}
