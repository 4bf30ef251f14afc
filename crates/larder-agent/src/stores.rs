// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process profile and context stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use larder_core::{
    ContextDelta, ContextStore, LarderError, Profile, ProfileStore, SessionContext, SessionId,
};
use serde::Serialize;

/// Turns kept per session before the oldest are dropped.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// One handled command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRecord {
    pub intent_type: String,
    pub command: String,
    pub at: DateTime<Utc>,
}

/// Profiles and activity held in memory.
#[derive(Debug)]
pub struct InMemoryProfileStore {
    default_language: String,
    profiles: DashMap<SessionId, Profile>,
    activity: DashMap<SessionId, Vec<ActivityRecord>>,
}

impl InMemoryProfileStore {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            default_language: default_language.into(),
            profiles: DashMap::new(),
            activity: DashMap::new(),
        }
    }

    /// Inserts or replaces a profile.
    pub fn put_profile(&self, profile: Profile) {
        self.profiles.insert(profile.session_id.clone(), profile);
    }

    pub fn activity(&self, session_id: &SessionId) -> Vec<ActivityRecord> {
        self.activity
            .get(session_id)
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new("pl")
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_or_create_profile(&self, session_id: &SessionId) -> Result<Profile, LarderError> {
        let profile = self
            .profiles
            .entry(session_id.clone())
            .or_insert_with(|| Profile::new(session_id.clone(), self.default_language.clone()));
        Ok(profile.clone())
    }

    async fn log_activity(
        &self,
        session_id: &SessionId,
        intent_type: &str,
        command: &str,
    ) -> Result<(), LarderError> {
        if let Some(mut profile) = self.profiles.get_mut(session_id) {
            profile.interactions += 1;
        }
        self.activity
            .entry(session_id.clone())
            .or_default()
            .push(ActivityRecord {
                intent_type: intent_type.to_string(),
                command: command.to_string(),
                at: Utc::now(),
            });
        Ok(())
    }
}

/// Session contexts held in memory, with a bounded history.
#[derive(Debug)]
pub struct InMemoryContextStore {
    history_limit: usize,
    contexts: DashMap<SessionId, SessionContext>,
}

impl InMemoryContextStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history_limit: history_limit.max(1),
            contexts: DashMap::new(),
        }
    }
}

impl Default for InMemoryContextStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn get_context(&self, session_id: &SessionId) -> Result<SessionContext, LarderError> {
        Ok(self
            .contexts
            .get(session_id)
            .map(|context| context.clone())
            .unwrap_or_default())
    }

    async fn update_context(
        &self,
        session_id: &SessionId,
        delta: ContextDelta,
    ) -> Result<(), LarderError> {
        let mut context = self.contexts.entry(session_id.clone()).or_default();
        context.data.extend(delta.set);
        if let Some(turn) = delta.turn {
            context.history.push(turn);
            let excess = context.history.len().saturating_sub(self.history_limit);
            context.history.drain(..excess);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use larder_core::ConversationTurn;
    use serde_json::json;

    use super::*;

    fn turn(n: usize) -> ConversationTurn {
        ConversationTurn {
            user: format!("q{n}"),
            assistant: format!("a{n}"),
            intent: "general".to_string(),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn profile_is_created_once_and_counts_activity() {
        let store = InMemoryProfileStore::new("en");
        let sid = SessionId::from("s1");
        let profile = store.get_or_create_profile(&sid).await.unwrap();
        assert_eq!(profile.language, "en");
        assert_eq!(profile.interactions, 0);

        store.log_activity(&sid, "recipe", "pierogi").await.unwrap();
        store.log_activity(&sid, "general", "hi").await.unwrap();
        let profile = store.get_or_create_profile(&sid).await.unwrap();
        assert_eq!(profile.interactions, 2);

        let activity = store.activity(&sid);
        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].intent_type, "recipe");
    }

    #[tokio::test]
    async fn unknown_session_has_empty_context() {
        let store = InMemoryContextStore::default();
        let context = store.get_context(&SessionId::from("nobody")).await.unwrap();
        assert!(context.history.is_empty());
        assert!(context.data.is_empty());
    }

    #[tokio::test]
    async fn deltas_are_applied_and_history_is_bounded() {
        let store = InMemoryContextStore::new(3);
        let sid = SessionId::from("s1");
        for n in 0..5 {
            let mut delta = ContextDelta {
                turn: Some(turn(n)),
                ..Default::default()
            };
            delta.set.insert("last".to_string(), json!(n));
            store.update_context(&sid, delta).await.unwrap();
        }
        let context = store.get_context(&sid).await.unwrap();
        assert_eq!(context.history.len(), 3);
        assert_eq!(context.history[0].user, "q2");
        assert_eq!(context.data["last"], json!(4));
    }
}
