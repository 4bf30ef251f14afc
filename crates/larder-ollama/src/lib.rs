// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ollama model backend for Larder.
//!
//! Implements [`ModelBackend`] over a local or remote Ollama server:
//! `/api/chat` for completions (NDJSON when streaming) and `/api/embed`
//! for embeddings.

pub mod client;
pub mod ndjson;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use larder_config::OllamaConfig;
use larder_core::{
    AdapterType, BackendRequest, ChunkStream, Completion, HealthStatus, LarderError,
    ModelBackend, PluginAdapter,
};
use tracing::{debug, info};

use crate::client::OllamaClient;
use crate::types::{ChatRequest, ChatResponse, EmbedRequest};

/// [`ModelBackend`] backed by the Ollama HTTP API.
pub struct OllamaBackend {
    client: OllamaClient,
}

impl OllamaBackend {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, LarderError> {
        let client = OllamaClient::new(base_url, request_timeout)?;
        info!(base_url = client.base_url(), "Ollama backend initialized");
        Ok(Self { client })
    }

    pub fn from_config(config: &OllamaConfig) -> Result<Self, LarderError> {
        Self::new(
            &config.base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl PluginAdapter for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ModelBackend
    }

    async fn health_check(&self) -> Result<HealthStatus, LarderError> {
        Ok(match self.client.tags().await {
            Ok(status) if status.is_success() => HealthStatus::Healthy,
            Ok(status) => HealthStatus::Degraded(format!("/api/tags returned {status}")),
            Err(e) => HealthStatus::Unhealthy(format!("Ollama unreachable: {e}")),
        })
    }

    async fn shutdown(&self) -> Result<(), LarderError> {
        debug!("Ollama backend shutting down");
        Ok(())
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    async fn complete(&self, request: BackendRequest) -> Result<Completion, LarderError> {
        let response = self
            .client
            .chat(&ChatRequest::from_backend(&request, false))
            .await?;
        Ok(Completion {
            content: response.content().to_string(),
            model: if response.model.is_empty() {
                request.model
            } else {
                response.model
            },
            prompt_tokens: response.prompt_eval_count,
            completion_tokens: response.eval_count,
        })
    }

    async fn stream(&self, request: BackendRequest) -> Result<ChunkStream, LarderError> {
        let model = request.model.clone();
        let response = self
            .client
            .chat_stream(&ChatRequest::from_backend(&request, true))
            .await?;

        let lines = ndjson::decode_lines::<ChatResponse, _, _>(model.clone(), response.bytes_stream());
        let chunks = lines.filter_map(move |line| {
            let model = model.clone();
            async move {
                match line {
                    Ok(ChatResponse {
                        error: Some(error), ..
                    }) => Some(Err(LarderError::backend(model, error))),
                    Ok(chunk) if chunk.content().is_empty() => None,
                    Ok(chunk) => Some(Ok(chunk.content().to_string())),
                    Err(err) => Some(Err(err)),
                }
            }
        });
        Ok(chunks.boxed())
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, LarderError> {
        self.client
            .embed(&EmbedRequest {
                model: model.to_string(),
                input: text.to_string(),
            })
            .await
    }
}
