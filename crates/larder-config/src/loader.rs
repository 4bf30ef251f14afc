// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order, later layers overriding earlier ones: compiled defaults,
//! `/etc/larder/larder.toml`, `~/.config/larder/larder.toml`,
//! `./larder.toml`, then `LARDER_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::LarderConfig;

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/larder/larder.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "larder.toml";

/// Per-user config file location, if the platform has a config directory.
pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("larder/larder.toml"))
}

/// Builds the full layered figment without extracting it.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(LarderConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH));
    if let Some(user) = user_config_path() {
        figment = figment.merge(Toml::file(user));
    }
    figment
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Loads configuration from the standard file hierarchy plus environment.
pub fn load_config() -> Result<LarderConfig, figment::Error> {
    build_figment().extract()
}

/// Loads configuration from an inline TOML document over compiled defaults.
///
/// No files or environment variables are consulted.
pub fn load_config_from_str(toml_content: &str) -> Result<LarderConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LarderConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Loads configuration from one explicit file, with environment overrides.
pub fn load_config_from_path(path: &Path) -> Result<LarderConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LarderConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Environment overrides, e.g. `LARDER_ROUTING_DEFAULT_MODEL` to
/// `routing.default_model`.
///
/// Only the leading section name is turned into a dot, since key names
/// themselves contain underscores. The model table cannot be set from the
/// environment.
fn env_provider() -> Env {
    const SECTIONS: [&str; 6] = ["agent", "routing", "fallback", "alerts", "metrics", "ollama"];

    Env::prefixed("LARDER_").map(|key| {
        let key_str = key.as_str();
        SECTIONS
            .iter()
            .find_map(|section| {
                key_str
                    .strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or_else(|| key_str.to_string())
            .into()
    })
}
