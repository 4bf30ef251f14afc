// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for the seams the orchestrator depends on.

pub mod adapter;
pub mod alert;
pub mod backend;
pub mod intent;
pub mod store;

pub use adapter::PluginAdapter;
pub use alert::AlertSink;
pub use backend::{ChunkStream, ModelBackend};
pub use intent::IntentClassifier;
pub use store::{ContextStore, ProfileStore};
