// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock model backend for deterministic testing.
//!
//! `MockBackend` implements `ModelBackend` with scripted replies and
//! failures, and records every call so tests can check which model was
//! used and how many calls ran at once.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use larder_core::{
    AdapterType, BackendRequest, ChunkStream, Completion, HealthStatus, LarderError, ModelBackend,
    PluginAdapter, Role,
};

/// One scripted backend reaction.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Text(String),
    /// Fails with a backend error carrying this message.
    Fail(String),
    /// Never answers.
    Hang,
}

/// Kind of call the backend received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Complete,
    Stream,
    Embed,
}

/// A call as the backend saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub model: String,
    /// Last user message, or the embedded text.
    pub prompt: String,
    pub has_images: bool,
}

#[derive(Debug, Default)]
struct Occupancy {
    current: HashMap<String, usize>,
    peak: HashMap<String, usize>,
}

/// Decrements the model's in-flight count when dropped.
struct OccupancyGuard {
    occupancy: Arc<Mutex<Occupancy>>,
    model: String,
}

impl Drop for OccupancyGuard {
    fn drop(&mut self) {
        let mut occupancy = lock(&self.occupancy);
        if let Some(count) = occupancy.current.get_mut(&self.model) {
            *count = count.saturating_sub(1);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock model backend.
///
/// Replies are popped from a FIFO queue shared by all models. When the
/// queue is empty the default reply ("mock response") is used. Streams
/// split the reply on word boundaries, so the chunks always concatenate
/// to the non-streamed answer.
pub struct MockBackend {
    replies: Mutex<VecDeque<MockReply>>,
    default_reply: Mutex<String>,
    delay: Mutex<Option<Duration>>,
    fail_all: AtomicBool,
    fail_next: AtomicUsize,
    failing_models: Mutex<HashSet<String>>,
    pause_streams: AtomicBool,
    calls: Mutex<Vec<RecordedCall>>,
    occupancy: Arc<Mutex<Occupancy>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: Mutex::new("mock response".to_string()),
            delay: Mutex::new(None),
            fail_all: AtomicBool::new(false),
            fail_next: AtomicUsize::new(0),
            failing_models: Mutex::new(HashSet::new()),
            pause_streams: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            occupancy: Arc::new(Mutex::new(Occupancy::default())),
        }
    }

    /// A backend pre-loaded with text replies.
    pub fn with_responses(responses: Vec<String>) -> Self {
        let backend = Self::new();
        for response in responses {
            backend.push_reply(MockReply::Text(response));
        }
        backend
    }

    /// A backend whose every call fails.
    pub fn failing() -> Self {
        let backend = Self::new();
        backend.set_failing(true);
        backend
    }

    pub fn push_reply(&self, reply: MockReply) {
        lock(&self.replies).push_back(reply);
    }

    pub fn set_default_reply(&self, reply: impl Into<String>) {
        *lock(&self.default_reply) = reply.into();
    }

    /// Every call waits `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    /// The next `count` calls fail, whatever the model.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Every call to `model` fails.
    pub fn fail_model(&self, model: &str) {
        lock(&self.failing_models).insert(model.to_string());
    }

    pub fn recover_model(&self, model: &str) {
        lock(&self.failing_models).remove(model);
    }

    /// Streams yield their first chunk and then stay pending until dropped.
    pub fn pause_streams(&self, pause: bool) {
        self.pause_streams.store(pause, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Models called, in call order.
    pub fn models_called(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|c| c.model.clone()).collect()
    }

    pub fn calls_for(&self, model: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.model == model).count()
    }

    /// Calls currently running against `model`.
    pub fn in_flight(&self, model: &str) -> usize {
        lock(&self.occupancy).current.get(model).copied().unwrap_or(0)
    }

    /// Highest number of simultaneous calls ever seen on `model`.
    pub fn max_in_flight(&self, model: &str) -> usize {
        lock(&self.occupancy).peak.get(model).copied().unwrap_or(0)
    }

    fn record(&self, kind: CallKind, request: &BackendRequest) {
        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let has_images = request.messages.iter().any(|m| !m.images.is_empty());
        lock(&self.calls).push(RecordedCall {
            kind,
            model: request.model.clone(),
            prompt,
            has_images,
        });
    }

    fn enter(&self, model: &str) -> OccupancyGuard {
        let mut occupancy = lock(&self.occupancy);
        let current = occupancy.current.entry(model.to_string()).or_insert(0);
        *current += 1;
        let now = *current;
        let peak = occupancy.peak.entry(model.to_string()).or_insert(0);
        *peak = (*peak).max(now);
        OccupancyGuard {
            occupancy: self.occupancy.clone(),
            model: model.to_string(),
        }
    }

    fn should_fail(&self, model: &str) -> bool {
        if self.fail_all.load(Ordering::SeqCst) || lock(&self.failing_models).contains(model) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Waits, applies failure rules, then resolves the next reply.
    async fn answer(&self, model: &str) -> Result<String, LarderError> {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail(model) {
            return Err(LarderError::backend(model, "mock failure"));
        }
        let reply = lock(&self.replies).pop_front();
        match reply {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail(message)) => Err(LarderError::backend(model, message)),
            Some(MockReply::Hang) => {
                std::future::pending::<()>().await;
                Err(LarderError::Internal("unreachable".to_string()))
            }
            None => Ok(lock(&self.default_reply).clone()),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ModelBackend
    }

    async fn health_check(&self) -> Result<HealthStatus, LarderError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LarderError> {
        Ok(())
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn complete(&self, request: BackendRequest) -> Result<Completion, LarderError> {
        self.record(CallKind::Complete, &request);
        let _guard = self.enter(&request.model);
        let content = self.answer(&request.model).await?;
        Ok(Completion {
            model: request.model,
            prompt_tokens: Some(10),
            completion_tokens: Some(20),
            content,
        })
    }

    async fn stream(&self, request: BackendRequest) -> Result<ChunkStream, LarderError> {
        self.record(CallKind::Stream, &request);
        let guard = self.enter(&request.model);
        let content = self.answer(&request.model).await?;
        let chunks: Vec<Result<String, LarderError>> = content
            .split_inclusive(' ')
            .map(|chunk| Ok(chunk.to_string()))
            .collect();

        let chunks = if self.pause_streams.load(Ordering::SeqCst) {
            stream::iter(chunks.into_iter().take(1))
                .chain(stream::pending())
                .boxed()
        } else {
            stream::iter(chunks).boxed()
        };
        // The guard lives as long as the stream.
        Ok(chunks
            .map(move |chunk| {
                let _ = &guard;
                chunk
            })
            .boxed())
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, LarderError> {
        lock(&self.calls).push(RecordedCall {
            kind: CallKind::Embed,
            model: model.to_string(),
            prompt: text.to_string(),
            has_images: false,
        });
        let _guard = self.enter(model);
        if self.should_fail(model) {
            return Err(LarderError::backend(model, "mock failure"));
        }
        Ok(deterministic_embedding(text))
    }
}

/// An 8-dimensional vector derived only from `text`.
pub fn deterministic_embedding(text: &str) -> Vec<f32> {
    let mut buckets = [0f32; 8];
    for byte in text.bytes() {
        buckets[usize::from(byte) % 8] += 1.0;
    }
    let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt().max(1.0);
    buckets.iter().map(|v| v / norm).collect()
}
