// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by backends, the router, and capability agents.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

/// Unique identifier for a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter owned by the process root.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    ModelBackend,
    ProfileStore,
    ContextStore,
    AlertSink,
    IntentClassifier,
}

/// Ordinal estimate of how demanding a request is.
///
/// Ordering follows severity: `Simple < Standard < Complex < Critical`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Simple,
    Standard,
    Complex,
    Critical,
}

impl ComplexityLevel {
    /// Every level, in ascending order.
    pub const ALL: [ComplexityLevel; 4] = [
        ComplexityLevel::Simple,
        ComplexityLevel::Standard,
        ComplexityLevel::Complex,
        ComplexityLevel::Critical,
    ];
}

/// How bad a surfaced failure is. Drives alerting.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Base64-encoded images for multimodal models.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, base64_image: String) -> Self {
        self.images.push(base64_image);
        self
    }
}

/// A fully resolved request to a model backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// A complete (non-streamed) backend answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub model: String,
    pub content: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

impl Completion {
    /// Token usage, estimated at four characters per token when the
    /// backend does not report counts.
    pub fn token_usage(&self) -> u64 {
        match (self.prompt_tokens, self.completion_tokens) {
            (None, None) => estimate_tokens(&self.content),
            (p, c) => u64::from(p.unwrap_or(0)) + u64::from(c.unwrap_or(0)),
        }
    }
}

/// Rough token estimate used wherever a backend reports nothing.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Broad family of an uploaded file, derived from its declared media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MediaFamily {
    Image,
    Document,
    Unsupported,
}

impl MediaFamily {
    /// Classifies a declared media type, falling back to the file extension
    /// when the declaration is missing or generic.
    pub fn detect(media_type: &str, filename: &str) -> Self {
        let media_type = media_type.trim().to_ascii_lowercase();
        let declared = media_type.split(';').next().unwrap_or_default().trim();
        if declared.starts_with("image/") {
            return Self::Image;
        }
        if declared.starts_with("text/")
            || declared == "application/pdf"
            || declared == "application/msword"
            || declared == "application/rtf"
            || declared.starts_with("application/vnd.openxmlformats-officedocument.")
            || declared.starts_with("application/vnd.oasis.opendocument.")
        {
            return Self::Document;
        }
        if declared.is_empty() || declared == "application/octet-stream" {
            let ext = filename
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .unwrap_or_default();
            return match ext.as_str() {
                "png" | "jpg" | "jpeg" | "webp" | "gif" | "bmp" | "heic" => Self::Image,
                "pdf" | "txt" | "md" | "csv" | "doc" | "docx" | "odt" | "rtf" => Self::Document,
                _ => Self::Unsupported,
            };
        }
        Self::Unsupported
    }
}

/// An uploaded file attached to a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn family(&self) -> MediaFamily {
        MediaFamily::detect(&self.media_type, &self.filename)
    }
}

/// A user command entering the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub text: String,
    pub session_id: SessionId,
    pub attachment: Option<Attachment>,
}

/// The result of intent classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub intent_type: String,
    #[serde(default)]
    pub entities: Map<String, Value>,
}

impl Intent {
    pub fn new(intent_type: impl Into<String>) -> Self {
        Self {
            intent_type: intent_type.into(),
            entities: Map::new(),
        }
    }
}

/// Per-session user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub session_id: SessionId,
    /// BCP-47-ish language tag ("pl", "en"). Used for localized replies.
    pub language: String,
    pub interactions: u64,
    #[serde(default)]
    pub preferences: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(session_id: SessionId, language: impl Into<String>) -> Self {
        Self {
            session_id,
            language: language.into(),
            interactions: 0,
            preferences: Map::new(),
            created_at: Utc::now(),
        }
    }
}

/// One completed exchange stored in the session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
    pub intent: String,
    pub at: DateTime<Utc>,
}

/// Per-session conversational state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub history: Vec<ConversationTurn>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl SessionContext {
    pub fn last_turn(&self) -> Option<&ConversationTurn> {
        self.history.last()
    }
}

/// Changes to apply to a session context after a command completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextDelta {
    /// Keys to set (or overwrite) in [`SessionContext::data`].
    #[serde(default)]
    pub set: Map<String, Value>,
    pub turn: Option<ConversationTurn>,
}

impl ContextDelta {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.turn.is_none()
    }

    /// Folds another delta into this one; keys in `other` win.
    pub fn merge(mut self, other: ContextDelta) -> Self {
        self.set.extend(other.set);
        if other.turn.is_some() {
            self.turn = other.turn;
        }
        self
    }
}

/// Everything a capability agent gets to see for one command.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInput {
    pub text: String,
    pub session_id: SessionId,
    pub entities: Map<String, Value>,
    pub context: SessionContext,
    pub attachment: Option<Attachment>,
    /// Profile-derived hint folded into prompts (language, preferences).
    pub personalization: Option<String>,
    pub language: String,
}

impl AgentInput {
    pub fn new(text: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            text: text.into(),
            session_id,
            entities: Map::new(),
            context: SessionContext::default(),
            attachment: None,
            personalization: None,
            language: "en".to_string(),
        }
    }

    /// Same input with a replacement query text.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..self.clone()
        }
    }
}

/// The structured result returned to callers.
///
/// Responses are built once by the agent or the orchestrator and only
/// extended through the consuming `with_*` methods before they leave the
/// layer that created them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResponse {
    pub success: bool,
    pub text: Option<String>,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub error_severity: Option<ErrorSeverity>,
    #[serde(rename = "processing_time", serialize_with = "serialize_secs")]
    pub processing_time: Duration,
    pub processed_with_fallback: bool,
    #[serde(skip)]
    pub context_update: Option<ContextDelta>,
    pub metadata: BTreeMap<String, Value>,
}

impl AgentResponse {
    /// A successful text answer.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: Some(text.into()),
            data: None,
            error: None,
            error_severity: None,
            processing_time: Duration::ZERO,
            processed_with_fallback: false,
            context_update: None,
            metadata: BTreeMap::new(),
        }
    }

    /// A failed response carrying a caller-facing message.
    pub fn failure(error: impl Into<String>, severity: ErrorSeverity) -> Self {
        Self {
            success: false,
            text: None,
            data: None,
            error: Some(error.into()),
            error_severity: Some(severity),
            processing_time: Duration::ZERO,
            processed_with_fallback: false,
            context_update: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_processing_time(mut self, elapsed: Duration) -> Self {
        self.processing_time = elapsed;
        self
    }

    pub fn with_fallback(mut self, processed_with_fallback: bool) -> Self {
        self.processed_with_fallback = processed_with_fallback;
        self
    }

    pub fn with_context_update(mut self, delta: ContextDelta) -> Self {
        self.context_update = Some(delta);
        self
    }

    /// Text shown to the user: the answer on success, the error otherwise.
    pub fn display_text(&self) -> &str {
        if self.success {
            self.text.as_deref().unwrap_or_default()
        } else {
            self.error.as_deref().unwrap_or_default()
        }
    }
}

fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}
