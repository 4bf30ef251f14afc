// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in capability agents.

pub mod attachment;
pub mod general;

use std::sync::Arc;

use larder_config::AgentConfig;
use larder_core::LarderError;

pub use attachment::{DocumentAgent, ImageAgent};
pub use general::ChatAgent;

use crate::capability::{AgentSettings, CapabilityAgent};
use crate::factory::{AgentFactory, AgentFactoryBuilder};

pub const GENERAL: &str = "general";
pub const RECIPE: &str = "recipe";
pub const SHOPPING: &str = "shopping";
pub const IMAGE_PROCESSING: &str = "image_processing";
pub const DOCUMENT_PROCESSING: &str = "document_processing";

/// Registers every built-in agent type.
///
/// `config.system_prompt`, when set, replaces the general agent's prompt.
pub fn register_builtin_agents(
    builder: &mut AgentFactoryBuilder,
    config: &AgentConfig,
) -> Result<(), LarderError> {
    let general_settings = AgentSettings {
        system_prompt: config.system_prompt.clone(),
        ..Default::default()
    };
    builder
        .register_with_settings(GENERAL, general_settings, |settings| {
            Arc::new(ChatAgent::from_settings(GENERAL, general::GENERAL_PROMPT, settings))
                as Arc<dyn CapabilityAgent>
        })?
        .register(RECIPE, |settings| {
            Arc::new(ChatAgent::from_settings(RECIPE, general::RECIPE_PROMPT, settings))
                as Arc<dyn CapabilityAgent>
        })?
        .register(SHOPPING, |settings| {
            Arc::new(ChatAgent::from_settings(SHOPPING, general::SHOPPING_PROMPT, settings))
                as Arc<dyn CapabilityAgent>
        })?
        .register(IMAGE_PROCESSING, |settings| {
            Arc::new(ImageAgent::from_settings(settings)) as Arc<dyn CapabilityAgent>
        })?
        .register(DOCUMENT_PROCESSING, |settings| {
            Arc::new(DocumentAgent::from_settings(settings)) as Arc<dyn CapabilityAgent>
        })?;
    Ok(())
}

/// A factory holding the built-in agents, defaulting to `config.default_agent_type`.
pub fn builtin_factory(config: &AgentConfig) -> Result<AgentFactory, LarderError> {
    let mut builder = AgentFactory::builder(config.default_agent_type.clone());
    register_builtin_agents(&mut builder, config)?;
    builder.build()
}
