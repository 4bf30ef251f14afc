// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent factory: maps intent types to agent constructors.
//!
//! The table is filled once through [`AgentFactoryBuilder`] and is
//! read-only afterwards. Unknown types resolve to the default agent.

use std::collections::HashMap;
use std::sync::Arc;

use larder_core::LarderError;
use tracing::{debug, warn};

use crate::capability::{AgentSettings, CapabilityAgent};

/// Builds an agent instance from its settings.
pub type AgentConstructor =
    Box<dyn Fn(&AgentSettings) -> Arc<dyn CapabilityAgent> + Send + Sync>;

struct AgentDescriptor {
    constructor: AgentConstructor,
    settings: AgentSettings,
}

/// Collects agent registrations before the factory is frozen.
pub struct AgentFactoryBuilder {
    default_type: String,
    descriptors: HashMap<String, AgentDescriptor>,
}

impl AgentFactoryBuilder {
    pub fn new(default_type: impl Into<String>) -> Self {
        Self {
            default_type: default_type.into(),
            descriptors: HashMap::new(),
        }
    }

    /// Registers `constructor` for `agent_type` with default settings.
    ///
    /// A type may be registered only once.
    pub fn register<F>(&mut self, agent_type: &str, constructor: F) -> Result<&mut Self, LarderError>
    where
        F: Fn(&AgentSettings) -> Arc<dyn CapabilityAgent> + Send + Sync + 'static,
    {
        self.register_with_settings(agent_type, AgentSettings::default(), constructor)
    }

    pub fn register_with_settings<F>(
        &mut self,
        agent_type: &str,
        settings: AgentSettings,
        constructor: F,
    ) -> Result<&mut Self, LarderError>
    where
        F: Fn(&AgentSettings) -> Arc<dyn CapabilityAgent> + Send + Sync + 'static,
    {
        if agent_type.trim().is_empty() {
            return Err(LarderError::Config("agent type must not be empty".to_string()));
        }
        if self.descriptors.contains_key(agent_type) {
            return Err(LarderError::Config(format!(
                "agent type '{agent_type}' is already registered"
            )));
        }
        self.descriptors.insert(
            agent_type.to_string(),
            AgentDescriptor {
                constructor: Box::new(constructor),
                settings,
            },
        );
        debug!(agent_type, "agent type registered");
        Ok(self)
    }

    /// Freezes the table. The default type must be registered.
    pub fn build(self) -> Result<AgentFactory, LarderError> {
        if !self.descriptors.contains_key(&self.default_type) {
            return Err(LarderError::Config(format!(
                "default agent type '{}' is not registered",
                self.default_type
            )));
        }
        Ok(AgentFactory {
            default_type: self.default_type,
            descriptors: self.descriptors,
        })
    }
}

/// Read-only constructor table.
pub struct AgentFactory {
    default_type: String,
    descriptors: HashMap<String, AgentDescriptor>,
}

impl AgentFactory {
    pub fn builder(default_type: impl Into<String>) -> AgentFactoryBuilder {
        AgentFactoryBuilder::new(default_type)
    }

    pub fn default_type(&self) -> &str {
        &self.default_type
    }

    pub fn contains(&self, agent_type: &str) -> bool {
        self.descriptors.contains_key(agent_type)
    }

    /// Registered type names, sorted.
    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Builds the agent for `agent_type` with its registered settings.
    ///
    /// Unregistered types log a warning and yield the default agent.
    pub fn create(&self, agent_type: &str) -> Arc<dyn CapabilityAgent> {
        let descriptor = self.resolve(agent_type);
        (descriptor.constructor)(&descriptor.settings)
    }

    /// Builds the agent for `agent_type` with caller-supplied settings.
    pub fn create_with(&self, agent_type: &str, settings: &AgentSettings) -> Arc<dyn CapabilityAgent> {
        (self.resolve(agent_type).constructor)(settings)
    }

    fn resolve(&self, agent_type: &str) -> &AgentDescriptor {
        if let Some(descriptor) = self.descriptors.get(agent_type) {
            return descriptor;
        }
        warn!(
            agent_type,
            default = %self.default_type,
            "unknown agent type, using default agent"
        );
        // `build` guarantees the default type is present.
        &self.descriptors[&self.default_type]
    }
}

impl std::fmt::Debug for AgentFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentFactory")
            .field("default_type", &self.default_type)
            .field("types", &self.registered_types())
            .finish()
    }
}
