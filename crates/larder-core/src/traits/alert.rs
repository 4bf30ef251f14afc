// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound operator alerts.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LarderError;
use crate::types::ErrorSeverity;

/// Delivers alerts about failures an operator should look at.
///
/// `should_alert` is the sink's own throttle and threshold check; callers
/// ask it first and only then call `send_alert`.
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn should_alert(&self, message: &str, severity: ErrorSeverity) -> bool;

    async fn send_alert(
        &self,
        message: &str,
        context: &Value,
        severity: ErrorSeverity,
    ) -> Result<(), LarderError>;
}
