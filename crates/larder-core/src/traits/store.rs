// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence seams for per-session profiles and conversation context.

use async_trait::async_trait;

use crate::error::LarderError;
use crate::types::{ContextDelta, Profile, SessionContext, SessionId};

/// Stores user profiles and the activity log.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Loads the profile for `session_id`, creating a default one on first contact.
    async fn get_or_create_profile(&self, session_id: &SessionId) -> Result<Profile, LarderError>;

    /// Records that a command of `intent_type` was handled for the session.
    async fn log_activity(
        &self,
        session_id: &SessionId,
        intent_type: &str,
        command: &str,
    ) -> Result<(), LarderError>;
}

/// Stores conversational state between commands.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Loads the context for `session_id`; an unknown session yields an empty context.
    async fn get_context(&self, session_id: &SessionId) -> Result<SessionContext, LarderError>;

    /// Applies `delta` to the stored context.
    async fn update_context(
        &self,
        session_id: &SessionId,
        delta: ContextDelta,
    ) -> Result<(), LarderError>;
}
