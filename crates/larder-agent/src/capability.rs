// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The capability agent contract.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use larder_core::{AgentInput, AgentResponse, LarderError};
use serde_json::{Map, Value};

use crate::handle::LlmHandle;

/// A stream of answer text handed back to the caller.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LarderError>> + Send>>;

/// Construction-time settings for an agent instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentSettings {
    /// Replaces the agent's built-in system prompt.
    pub system_prompt: Option<String>,
    /// Free-form agent-specific options.
    pub options: Map<String, Value>,
}

impl AgentSettings {
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// A unit of request handling for one intent type.
///
/// Agents talk to models only through the [`LlmHandle`] they are given,
/// which carries the routing plan and cancellation for the current
/// attempt. They never pick a model themselves.
#[async_trait]
pub trait CapabilityAgent: Send + Sync {
    /// Agent type name, as registered in the factory.
    fn name(&self) -> &str;

    /// Rejects malformed input before any model is called.
    ///
    /// The default requires non-blank text or an attachment.
    fn validate(&self, input: &AgentInput) -> Result<(), LarderError> {
        if input.text.trim().is_empty() && input.attachment.is_none() {
            return Err(LarderError::Validation(
                "command text must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Handles one command.
    async fn process(
        &self,
        input: &AgentInput,
        llm: &LlmHandle,
    ) -> Result<AgentResponse, LarderError>;

    /// Whether [`stream_process`](CapabilityAgent::stream_process) is implemented.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Handles one command, yielding the answer incrementally.
    async fn stream_process(
        &self,
        input: &AgentInput,
        llm: &LlmHandle,
    ) -> Result<TextStream, LarderError> {
        let _ = (input, llm);
        Err(LarderError::Validation(format!(
            "agent {} does not support streaming",
            self.name()
        )))
    }
}
