// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Larder assistant.

use std::time::Duration;

use thiserror::Error;

use crate::types::{ComplexityLevel, ErrorSeverity};

/// The primary error type used across backends, routing, and agents.
#[derive(Debug, Error)]
pub enum LarderError {
    /// Configuration errors (invalid model table, duplicate registrations).
    #[error("configuration error: {0}")]
    Config(String),

    /// The request itself is malformed. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The model backend rejected or failed the call.
    #[error("backend error from {model}: {message}")]
    Backend {
        model: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A backend call or slot wait exceeded its deadline.
    #[error("model {model} timed out after {duration:?}")]
    Timeout { model: String, duration: Duration },

    /// No concurrency slot is free for the model.
    #[error("no free concurrency slot for model {model}")]
    CapacitySaturated { model: String },

    /// No enabled model declares support for the requested level.
    #[error("no enabled model supports complexity level {level}")]
    ComplexityMismatch { level: ComplexityLevel },

    /// A model name that is not present in the registry.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// Profile or context store failure.
    #[error("store error: {message}")]
    Store {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Every recovery tier failed.
    #[error("unrecoverable failure: {0}")]
    Critical(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LarderError {
    /// Shorthand for a backend failure without an underlying source.
    pub fn backend(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            model: model.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a store failure without an underlying source.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Failures that may succeed if the same call is repeated later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Backend { .. } | Self::Timeout { .. } | Self::CapacitySaturated { .. }
        )
    }

    /// Whether the fallback chain may act on this error at all.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Validation(_) | Self::Cancelled)
    }

    /// Severity used when the error is surfaced in a structured response.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Validation(_) | Self::Cancelled => ErrorSeverity::Low,
            Self::Backend { .. }
            | Self::Timeout { .. }
            | Self::CapacitySaturated { .. }
            | Self::ComplexityMismatch { .. }
            | Self::UnknownModel(_) => ErrorSeverity::Medium,
            Self::Store { .. } | Self::Config(_) => ErrorSeverity::High,
            Self::Critical(_) | Self::Internal(_) => ErrorSeverity::Critical,
        }
    }

    /// The model a failure is attributed to, if any.
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Backend { model, .. }
            | Self::Timeout { model, .. }
            | Self::CapacitySaturated { model } => Some(model),
            Self::UnknownModel(model) => Some(model),
            _ => None,
        }
    }

    /// Short machine-readable tag, used in metrics labels and response metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Validation(_) => "validation",
            Self::Backend { .. } => "backend",
            Self::Timeout { .. } => "timeout",
            Self::CapacitySaturated { .. } => "capacity_saturated",
            Self::ComplexityMismatch { .. } => "complexity_mismatch",
            Self::UnknownModel(_) => "unknown_model",
            Self::Cancelled => "cancelled",
            Self::Store { .. } => "store",
            Self::Critical(_) => "critical",
            Self::Internal(_) => "internal",
        }
    }
}
