// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request orchestration for Larder.
//!
//! The [`Orchestrator`] turns a command into an [`AgentResponse`](larder_core::AgentResponse):
//! it resolves the session, classifies intent, picks a capability agent
//! from the [`AgentFactory`], and runs it through [`AgentExecutor::safe_process`],
//! which owns validation and the bounded [`FallbackChain`].

pub mod agents;
pub mod alert;
pub mod capability;
pub mod executor;
pub mod factory;
pub mod fallback;
pub mod handle;
pub mod intent;
pub mod orchestrator;
pub mod shutdown;
pub mod stores;

pub use alert::LogAlertSink;
pub use capability::{AgentSettings, CapabilityAgent, TextStream};
pub use executor::{AgentExecutor, StreamOutcome};
pub use factory::{AgentConstructor, AgentFactory, AgentFactoryBuilder};
pub use fallback::{FallbackChain, FallbackOutcome, FallbackPolicy, FallbackState};
pub use handle::{LlmHandle, RoutePlan};
pub use intent::KeywordIntentClassifier;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use shutdown::{InFlight, drain_in_flight, install_signal_handler};
pub use stores::{InMemoryContextStore, InMemoryProfileStore};
