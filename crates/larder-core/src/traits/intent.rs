// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intent classification seam.

use async_trait::async_trait;

use crate::error::LarderError;
use crate::types::{Intent, SessionContext};

/// Maps a command's text (plus session context) to an intent.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str, context: &SessionContext) -> Result<Intent, LarderError>;
}
