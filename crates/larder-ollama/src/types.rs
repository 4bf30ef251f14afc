// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ollama HTTP API request and response types.

use larder_core::{BackendRequest, ChatMessage};
use serde::{Deserialize, Serialize};

// --- Chat ---

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ModelOptions>,
}

impl ChatRequest {
    pub fn from_backend(request: &BackendRequest, stream: bool) -> Self {
        let options = (request.temperature.is_some() || request.max_tokens.is_some()).then(|| {
            ModelOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            }
        });
        Self {
            model: request.model.clone(),
            messages: request.messages.iter().map(ApiMessage::from).collect(),
            stream,
            options,
        }
    }
}

/// One chat message on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct ApiMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    pub content: String,
    /// Base64-encoded images for vision models.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl From<&ChatMessage> for ApiMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.to_string(),
            content: message.content.clone(),
            images: message.images.clone(),
        }
    }
}

/// Sampling options.
#[derive(Debug, Clone, Serialize)]
pub struct ModelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Generation limit in tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

/// A non-streamed chat answer, or one NDJSON line of a streamed one.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    #[serde(default)]
    pub eval_count: Option<u32>,
    /// Set when the server fails mid-stream.
    #[serde(default)]
    pub error: Option<String>,
}

impl ChatResponse {
    /// The text carried by this response; empty for a bare `done` marker.
    pub fn content(&self) -> &str {
        self.message
            .as_ref()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

// --- Embeddings ---

/// Body of `POST /api/embed`.
#[derive(Debug, Clone, Serialize)]
pub struct EmbedRequest {
    pub model: String,
    pub input: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbedResponse {
    #[serde(default)]
    pub embeddings: Vec<Vec<f32>>,
}

// --- Errors ---

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serializes_options_only_when_set() {
        let request = BackendRequest {
            model: "llama3.2:3b".into(),
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
            max_tokens: None,
            temperature: None,
        };
        let json = serde_json::to_value(ChatRequest::from_backend(&request, false)).unwrap();
        assert_eq!(json["model"], "llama3.2:3b");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert!(json.get("options").is_none());
        assert!(json["messages"][1].get("images").is_none());

        let request = BackendRequest {
            max_tokens: Some(256),
            temperature: Some(0.2),
            ..request
        };
        let json = serde_json::to_value(ChatRequest::from_backend(&request, true)).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["options"]["num_predict"], 256);
    }

    #[test]
    fn images_are_forwarded() {
        let message = ChatMessage::user("what is this?").with_image("aGVsbG8=".into());
        let json = serde_json::to_value(ApiMessage::from(&message)).unwrap();
        assert_eq!(json["images"][0], "aGVsbG8=");
    }

    #[test]
    fn done_marker_has_empty_content() {
        let chunk: ChatResponse =
            serde_json::from_str(r#"{"model":"m","done":true,"eval_count":12}"#).unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.content(), "");
        assert_eq!(chunk.eval_count, Some(12));
    }
}
