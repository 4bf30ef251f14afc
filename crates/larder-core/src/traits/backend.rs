// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model backend trait: the narrow seam to the LLM runtime.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::LarderError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{BackendRequest, Completion};

/// A stream of text chunks produced by a backend.
///
/// Concatenating every `Ok` item yields the same text a non-streamed
/// completion would have returned.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, LarderError>> + Send>>;

/// Executes chat completions and embeddings against named models.
///
/// Backends are not responsible for model choice, concurrency limits, or
/// deadlines. The router applies all three before calling in.
#[async_trait]
pub trait ModelBackend: PluginAdapter {
    /// Runs a chat completion and returns the full answer.
    async fn complete(&self, request: BackendRequest) -> Result<Completion, LarderError>;

    /// Runs a chat completion and returns the answer as incremental chunks.
    async fn stream(&self, request: BackendRequest) -> Result<ChunkStream, LarderError>;

    /// Returns an embedding vector for `text` from `model`.
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, LarderError>;
}
