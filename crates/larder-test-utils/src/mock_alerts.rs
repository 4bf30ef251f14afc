// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert sink that records alerts for assertions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use larder_core::{AlertSink, ErrorSeverity, LarderError};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAlert {
    pub message: String,
    pub context: Value,
    pub severity: ErrorSeverity,
}

/// Accepts every alert (unless muted) and keeps it.
#[derive(Debug)]
pub struct RecordingAlertSink {
    accept: AtomicBool,
    alerts: Mutex<Vec<RecordedAlert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self {
            accept: AtomicBool::new(true),
            alerts: Mutex::new(Vec::new()),
        }
    }

    /// While muted, `should_alert` answers `false`.
    pub fn mute(&self, muted: bool) {
        self.accept.store(!muted, Ordering::SeqCst);
    }

    pub fn alerts(&self) -> Vec<RecordedAlert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for RecordingAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    fn should_alert(&self, _message: &str, _severity: ErrorSeverity) -> bool {
        self.accept.load(Ordering::SeqCst)
    }

    async fn send_alert(
        &self,
        message: &str,
        context: &Value,
        severity: ErrorSeverity,
    ) -> Result<(), LarderError> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedAlert {
                message: message.to_string(),
                context: context.clone(),
                severity,
            });
        Ok(())
    }
}
