// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `larder status`, `larder models`, and `larder config`.

use std::fmt::Write as _;
use std::sync::Arc;

use larder_config::LarderConfig;
use larder_core::{HealthStatus, LarderError, ModelBackend};
use larder_ollama::OllamaBackend;
use larder_router::{HybridClient, MaintenanceReport, ModelStatus};
use serde::Serialize;

/// Structured output of `larder status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub backend: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_detail: Option<String>,
    pub maintenance: MaintenanceReport,
}

fn client(config: &LarderConfig) -> Result<HybridClient, LarderError> {
    let backend: Arc<dyn ModelBackend> = Arc::new(OllamaBackend::from_config(&config.ollama)?);
    HybridClient::from_config(backend, config)
}

/// Runs `larder status`.
pub async fn run_status(config: &LarderConfig) -> Result<(), LarderError> {
    let client = client(config)?;
    let health = client.health_check().await?;
    let (healthy, health_detail) = match health {
        HealthStatus::Healthy => (true, None),
        HealthStatus::Degraded(detail) | HealthStatus::Unhealthy(detail) => (false, Some(detail)),
    };
    let status = StatusResponse {
        backend: config.ollama.base_url.clone(),
        healthy,
        health_detail,
        maintenance: client.maintenance(),
    };
    let json = serde_json::to_string_pretty(&status)
        .map_err(|e| LarderError::Internal(format!("failed to encode status: {e}")))?;
    println!("{json}");
    Ok(())
}

/// Runs `larder models`.
pub fn run_models(config: &LarderConfig) -> Result<(), LarderError> {
    let client = client(config)?;
    print!("{}", render_models(&client.models_status(), &config.routing.default_model));
    Ok(())
}

/// Runs `larder config`.
pub fn run_config(config: &LarderConfig) -> Result<(), LarderError> {
    print!("{}", render_config(config)?);
    Ok(())
}

/// One line per model, in preference order.
pub fn render_models(models: &[ModelStatus], default_model: &str) -> String {
    let mut out = String::new();
    for model in models {
        let levels = if model.levels.is_empty() {
            "-".to_string()
        } else {
            model
                .levels
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        let mut flags = Vec::new();
        if model.name == default_model {
            flags.push("default");
        }
        if !model.enabled {
            flags.push("disabled");
        }
        if model.supports_streaming {
            flags.push("stream");
        }
        if model.supports_embedding {
            flags.push("embed");
        }
        let _ = writeln!(
            out,
            "{:<24} priority={:<3} slots={}/{} levels={} {}",
            model.name,
            model.priority,
            model.available_slots,
            model.max_concurrency,
            levels,
            flags.join(" ")
        );
    }
    out
}

pub fn render_config(config: &LarderConfig) -> Result<String, LarderError> {
    toml::to_string_pretty(config)
        .map_err(|e| LarderError::Internal(format!("failed to encode config: {e}")))
}
