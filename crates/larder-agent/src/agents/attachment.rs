// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agents for uploaded images and documents.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use larder_core::{
    AgentInput, AgentResponse, Attachment, ChatMessage, ComplexityLevel, LarderError,
    MediaFamily,
};
use larder_router::{CompletionOptions, CompletionOutcome};
use serde_json::json;

use crate::capability::{AgentSettings, CapabilityAgent};
use crate::handle::LlmHandle;

pub const IMAGE_PROMPT: &str = "You are Larder. The user sent a photo, usually a receipt, \
a product, or the inside of a fridge. List the food items you can identify, with \
quantities and prices when visible. Reply in the user's language.";

pub const DOCUMENT_PROMPT: &str = "You are Larder. The user sent a document, usually a \
receipt or a recipe. Summarise the food-related content: items, quantities, prices, or \
recipe steps. Reply in the user's language.";

const DEFAULT_IMAGE_REQUEST: &str = "What food items are in this picture?";
const DEFAULT_DOCUMENT_REQUEST: &str = "What is in this document?";

/// Document text beyond this many characters is cut off.
pub const MAX_DOCUMENT_CHARS: usize = 12_000;

fn require_attachment(input: &AgentInput, family: MediaFamily) -> Result<&Attachment, LarderError> {
    let attachment = input
        .attachment
        .as_ref()
        .ok_or_else(|| LarderError::Validation("an attached file is required".to_string()))?;
    if attachment.bytes.is_empty() {
        return Err(LarderError::Validation(format!(
            "attached file {} is empty",
            attachment.filename
        )));
    }
    if attachment.family() != family {
        return Err(LarderError::Validation(format!(
            "attached file {} is not {family}",
            attachment.filename
        )));
    }
    Ok(attachment)
}

fn file_response(outcome: CompletionOutcome, attachment: &Attachment) -> AgentResponse {
    AgentResponse::text(outcome.completion.content)
        .with_data(json!({
            "filename": attachment.filename,
            "media_type": attachment.media_type,
            "size_bytes": attachment.bytes.len(),
        }))
        .with_metadata("model", outcome.decision.model)
}

fn request_text(input: &AgentInput, fallback: &str) -> String {
    if input.text.trim().is_empty() {
        fallback.to_string()
    } else {
        input.text.clone()
    }
}

/// Sends an uploaded image to a vision-capable model.
#[derive(Debug, Clone)]
pub struct ImageAgent {
    system_prompt: String,
}

impl ImageAgent {
    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            system_prompt: settings
                .system_prompt
                .clone()
                .unwrap_or_else(|| IMAGE_PROMPT.to_string()),
        }
    }
}

#[async_trait]
impl CapabilityAgent for ImageAgent {
    fn name(&self) -> &str {
        "image_processing"
    }

    fn validate(&self, input: &AgentInput) -> Result<(), LarderError> {
        require_attachment(input, MediaFamily::Image).map(|_| ())
    }

    async fn process(
        &self,
        input: &AgentInput,
        llm: &LlmHandle,
    ) -> Result<AgentResponse, LarderError> {
        let attachment = require_attachment(input, MediaFamily::Image)?;
        let message = ChatMessage::user(request_text(input, DEFAULT_IMAGE_REQUEST))
            .with_image(BASE64.encode(&attachment.bytes));
        // Reading an image is never a simple task.
        let options = CompletionOptions::default()
            .with_system_prompt(self.system_prompt.clone())
            .with_level(ComplexityLevel::Standard);
        let outcome = llm.complete(vec![message], options).await?;
        Ok(file_response(outcome, attachment))
    }
}

/// Feeds the text of an uploaded document to the model.
#[derive(Debug, Clone)]
pub struct DocumentAgent {
    system_prompt: String,
}

impl DocumentAgent {
    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            system_prompt: settings
                .system_prompt
                .clone()
                .unwrap_or_else(|| DOCUMENT_PROMPT.to_string()),
        }
    }

    fn document_text(attachment: &Attachment) -> Result<String, LarderError> {
        let text = std::str::from_utf8(&attachment.bytes).map_err(|_| {
            LarderError::Validation(format!(
                "document {} does not contain readable text",
                attachment.filename
            ))
        })?;
        Ok(text.chars().take(MAX_DOCUMENT_CHARS).collect())
    }
}

#[async_trait]
impl CapabilityAgent for DocumentAgent {
    fn name(&self) -> &str {
        "document_processing"
    }

    fn validate(&self, input: &AgentInput) -> Result<(), LarderError> {
        let attachment = require_attachment(input, MediaFamily::Document)?;
        Self::document_text(attachment).map(|_| ())
    }

    async fn process(
        &self,
        input: &AgentInput,
        llm: &LlmHandle,
    ) -> Result<AgentResponse, LarderError> {
        let attachment = require_attachment(input, MediaFamily::Document)?;
        let document = Self::document_text(attachment)?;
        let request = request_text(input, DEFAULT_DOCUMENT_REQUEST);
        let message = ChatMessage::user(format!(
            "{request}\n\n--- {} ---\n{document}",
            attachment.filename
        ));
        let options = CompletionOptions::default().with_system_prompt(self.system_prompt.clone());
        let outcome = llm.complete(vec![message], options).await?;
        Ok(file_response(outcome, attachment))
    }
}

#[cfg(test)]
mod tests {
    use larder_core::SessionId;

    use super::*;

    fn input_with(filename: &str, media_type: &str, bytes: &[u8]) -> AgentInput {
        let mut input = AgentInput::new("", SessionId::from("s"));
        input.attachment = Some(Attachment {
            filename: filename.to_string(),
            media_type: media_type.to_string(),
            bytes: bytes.to_vec(),
        });
        input
    }

    #[test]
    fn image_agent_requires_an_image() {
        let agent = ImageAgent::from_settings(&AgentSettings::default());
        assert!(agent.validate(&input_with("a.png", "image/png", b"\x89PNG")).is_ok());
        assert!(matches!(
            agent.validate(&input_with("a.txt", "text/plain", b"hello")),
            Err(LarderError::Validation(_))
        ));
        assert!(matches!(
            agent.validate(&input_with("a.png", "image/png", b"")),
            Err(LarderError::Validation(_))
        ));
        assert!(matches!(
            agent.validate(&AgentInput::new("hi", SessionId::from("s"))),
            Err(LarderError::Validation(_))
        ));
    }

    #[test]
    fn document_agent_requires_readable_text() {
        let agent = DocumentAgent::from_settings(&AgentSettings::default());
        assert!(agent.validate(&input_with("r.txt", "text/plain", b"mleko 3.49")).is_ok());
        assert!(matches!(
            agent.validate(&input_with("r.pdf", "application/pdf", &[0xff, 0xfe, 0x00])),
            Err(LarderError::Validation(_))
        ));
    }

    #[test]
    fn long_documents_are_truncated() {
        let long = "x".repeat(MAX_DOCUMENT_CHARS + 10);
        let input = input_with("r.txt", "text/plain", long.as_bytes());
        let text = DocumentAgent::document_text(input.attachment.as_ref().unwrap()).unwrap();
        assert_eq!(text.chars().count(), MAX_DOCUMENT_CHARS);
    }

    #[test]
    fn blank_text_uses_default_request() {
        let input = input_with("a.png", "image/png", b"x");
        assert_eq!(request_text(&input, DEFAULT_IMAGE_REQUEST), DEFAULT_IMAGE_REQUEST);
        let input = input.with_text("how much was the milk?");
        assert_eq!(request_text(&input, DEFAULT_IMAGE_REQUEST), "how much was the milk?");
    }
}
