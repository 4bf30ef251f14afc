// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Larder assistant.
//!
//! This crate provides the trait seams, error type, and shared request and
//! response types used throughout the Larder workspace. Backends, stores,
//! and alert sinks implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

pub use error::LarderError;
pub use types::{
    AdapterType, AgentInput, AgentResponse, Attachment, BackendRequest, ChatMessage, Command,
    ComplexityLevel, Completion, ContextDelta, ConversationTurn, ErrorSeverity, HealthStatus,
    Intent, MediaFamily, Profile, Role, SessionContext, SessionId,
};

pub use traits::{
    AlertSink, ChunkStream, ContextStore, IntentClassifier, ModelBackend, PluginAdapter,
    ProfileStore,
};
