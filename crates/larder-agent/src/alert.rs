// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert sink that writes to the log, with severity gating and
//! duplicate suppression.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use larder_config::AlertConfig;
use larder_core::{AlertSink, ErrorSeverity, LarderError};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error};

const THROTTLE_KEY_CHARS: usize = 50;

/// Emits alerts as `error`-level log events.
///
/// An alert is suppressed when one with the same leading message text was
/// sent within the throttle window. Entries older than the window are
/// evicted on every send, so the table only holds keys that can still
/// suppress something.
#[derive(Debug)]
pub struct LogAlertSink {
    enabled: bool,
    min_severity: ErrorSeverity,
    throttle: Duration,
    last_sent: DashMap<String, Instant>,
}

impl LogAlertSink {
    pub fn new(min_severity: ErrorSeverity, throttle: Duration) -> Self {
        Self {
            enabled: true,
            min_severity,
            throttle,
            last_sent: DashMap::new(),
        }
    }

    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            enabled: config.enabled,
            ..Self::new(config.min_severity, Duration::from_secs(config.throttle_secs))
        }
    }

    fn throttle_key(message: &str) -> String {
        message.chars().take(THROTTLE_KEY_CHARS).collect()
    }
}

impl Default for LogAlertSink {
    fn default() -> Self {
        Self::from_config(&AlertConfig::default())
    }
}

#[async_trait]
impl AlertSink for LogAlertSink {
    fn should_alert(&self, message: &str, severity: ErrorSeverity) -> bool {
        if !self.enabled || severity < self.min_severity {
            return false;
        }
        match self.last_sent.get(&Self::throttle_key(message)) {
            Some(sent) if sent.elapsed() < self.throttle => {
                debug!(severity = %severity, "alert throttled");
                false
            }
            _ => true,
        }
    }

    async fn send_alert(
        &self,
        message: &str,
        context: &Value,
        severity: ErrorSeverity,
    ) -> Result<(), LarderError> {
        let throttle = self.throttle;
        self.last_sent.retain(|_, sent| sent.elapsed() < throttle);
        self.last_sent
            .insert(Self::throttle_key(message), Instant::now());
        error!(severity = %severity, context = %context, "ALERT: {message}");
        Ok(())
    }
}
