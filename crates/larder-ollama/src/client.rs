// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Ollama API.
//!
//! One request per call and no transport-level retry: retries belong to the
//! agent fallback chain, which bounds the total number of model calls.

use std::time::Duration;

use larder_core::LarderError;
use reqwest::StatusCode;
use tracing::debug;

use crate::types::{ApiErrorResponse, ChatRequest, ChatResponse, EmbedRequest, EmbedResponse};

/// Thin wrapper over a pooled `reqwest::Client` bound to one Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, LarderError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LarderError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `POST /api/chat` with `stream: false`.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LarderError> {
        let response = self.post_chat(request).await?;
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&request.model, e))?;
        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| LarderError::Backend {
            model: request.model.clone(),
            message: format!("failed to parse chat response: {e}"),
            source: Some(Box::new(e)),
        })?;
        match parsed.error {
            Some(error) => Err(LarderError::backend(&request.model, error)),
            None => Ok(parsed),
        }
    }

    /// `POST /api/chat` with `stream: true`; the caller decodes the NDJSON body.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<reqwest::Response, LarderError> {
        self.post_chat(request).await
    }

    /// `POST /api/embed`, returning the first embedding.
    pub async fn embed(&self, request: &EmbedRequest) -> Result<Vec<f32>, LarderError> {
        let response = self
            .client
            .post(self.url("/api/embed"))
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(&request.model, e))?;
        let response = check_status(&request.model, response).await?;
        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| transport_error(&request.model, e))?;
        parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| LarderError::backend(&request.model, "no embedding returned"))
    }

    /// `GET /api/tags`; returns the HTTP status.
    pub async fn tags(&self) -> Result<StatusCode, reqwest::Error> {
        let response = self.client.get(self.url("/api/tags")).send().await?;
        Ok(response.status())
    }

    async fn post_chat(&self, request: &ChatRequest) -> Result<reqwest::Response, LarderError> {
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(&request.model, e))?;
        debug!(model = %request.model, status = %response.status(), stream = request.stream, "chat response received");
        check_status(&request.model, response).await
    }
}

async fn check_status(
    model: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, LarderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(api_err) => format!("Ollama error ({status}): {}", api_err.error),
        Err(_) => format!("Ollama returned {status}: {body}"),
    };
    Err(LarderError::backend(model, message))
}

fn transport_error(model: &str, err: reqwest::Error) -> LarderError {
    let message = if err.is_connect() {
        format!("failed to connect to Ollama: {err}")
    } else if err.is_timeout() {
        format!("HTTP request timed out: {err}")
    } else {
        format!("HTTP request failed: {err}")
    };
    LarderError::Backend {
        model: model.to_string(),
        message,
        source: Some(Box::new(err)),
    }
}
