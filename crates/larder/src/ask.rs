// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `larder ask` and `larder file` command implementations.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use larder_agent::{Orchestrator, StreamOutcome, drain_in_flight, install_signal_handler};
use larder_config::LarderConfig;
use larder_core::{AgentResponse, LarderError, ModelBackend, SessionId};
use larder_ollama::OllamaBackend;
use larder_router::HybridClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the process-root client and an orchestrator over it.
pub fn build_orchestrator(
    config: &LarderConfig,
    shutdown: CancellationToken,
) -> Result<Arc<Orchestrator>, LarderError> {
    let backend: Arc<dyn ModelBackend> = Arc::new(OllamaBackend::from_config(&config.ollama)?);
    let client = Arc::new(HybridClient::from_config(backend, config)?);
    let orchestrator = Orchestrator::builder_from_config(client, config)?
        .shutdown_token(shutdown)
        .build();
    Ok(Arc::new(orchestrator))
}

/// Runs `larder ask`. Returns whether the request succeeded.
pub async fn run_ask(
    config: &LarderConfig,
    text: &str,
    session: &str,
    stream: bool,
) -> Result<bool, LarderError> {
    let shutdown = install_signal_handler();
    let orchestrator = build_orchestrator(config, shutdown.clone())?;
    let session_id = SessionId::from(session);

    let succeeded = if stream {
        let outcome = orchestrator
            .stream_command(text, &session_id, shutdown.child_token())
            .await;
        print_stream(outcome).await?
    } else {
        let response = orchestrator.process_command(text, &session_id).await;
        print_response(&response)?
    };

    finish(&orchestrator).await;
    Ok(succeeded)
}

/// Runs `larder file`. Returns whether the upload was processed.
pub async fn run_file(
    config: &LarderConfig,
    path: &Path,
    session: &str,
    media_type: Option<&str>,
) -> Result<bool, LarderError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LarderError::Validation(format!("cannot read {}: {e}", path.display())))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let media_type = media_type.unwrap_or("application/octet-stream");
    info!(filename = %filename, media_type, size = bytes.len(), "uploading file");

    let shutdown = install_signal_handler();
    let orchestrator = build_orchestrator(config, shutdown)?;
    let response = orchestrator
        .process_file(bytes, &filename, &SessionId::from(session), media_type)
        .await;
    let succeeded = print_response(&response)?;

    finish(&orchestrator).await;
    Ok(succeeded)
}

async fn print_stream(outcome: StreamOutcome) -> Result<bool, LarderError> {
    let mut chunks = match outcome {
        StreamOutcome::Streaming(chunks) => chunks,
        StreamOutcome::Complete(response) => return print_response(&response),
    };
    let mut out = std::io::stdout();
    let mut succeeded = true;
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(chunk) => {
                write!(out, "{chunk}").map_err(io_error)?;
                out.flush().map_err(io_error)?;
            }
            Err(err) => {
                writeln!(out).map_err(io_error)?;
                eprintln!("error: {err}");
                succeeded = false;
                break;
            }
        }
    }
    if succeeded {
        writeln!(out).map_err(io_error)?;
    }
    Ok(succeeded)
}

fn print_response(response: &AgentResponse) -> Result<bool, LarderError> {
    debug!(metadata = ?response.metadata, "response metadata");
    let rendered = render_response(response);
    if response.success {
        writeln!(std::io::stdout(), "{rendered}").map_err(io_error)?;
    } else {
        eprintln!("{rendered}");
    }
    Ok(response.success)
}

/// Text printed for a finished response.
pub fn render_response(response: &AgentResponse) -> String {
    let mut rendered = response.display_text().to_string();
    if !response.success {
        rendered = format!("error: {rendered}");
    }
    if let Some(data) = &response.data {
        rendered.push('\n');
        rendered.push_str(&data.to_string());
    }
    if response.processed_with_fallback {
        rendered.push_str("\n(answered by fallback)");
    }
    rendered
}

async fn finish(orchestrator: &Orchestrator) {
    if !drain_in_flight(orchestrator.in_flight(), DRAIN_TIMEOUT).await {
        warn!("requests still running at exit");
    }
    if let Err(err) = orchestrator.shutdown().await {
        warn!(error = %err, "backend shutdown failed");
    }
}

fn io_error(err: std::io::Error) -> LarderError {
    LarderError::Internal(format!("failed to write output: {err}"))
}
