// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Larder - food assistant orchestration with multi-model routing.
//!
//! This is the binary entry point. It owns the process-root
//! [`larder_router::HybridClient`] and shuts it down on exit.

mod ask;
mod status;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

/// Larder - food assistant orchestration with multi-model routing.
#[derive(Parser, Debug)]
#[command(name = "larder", version, about, long_about = None)]
struct Cli {
    /// Load this file instead of searching the standard locations.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a text command through the orchestrator.
    Ask {
        text: String,
        #[arg(long, default_value = "cli")]
        session: String,
        /// Print the answer as it is generated.
        #[arg(long)]
        stream: bool,
    },
    /// Upload a file (image or document) for processing.
    File {
        path: PathBuf,
        #[arg(long, default_value = "cli")]
        session: String,
        /// Declared media type; detected from the extension when omitted.
        #[arg(long)]
        media_type: Option<String>,
    },
    /// Print usage statistics and backend health as JSON.
    Status,
    /// List configured models and their free slots.
    Models,
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => larder_config::load_and_validate_path(path),
        None => larder_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            larder_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.agent.log_level);
    larder_router::recording::register_metrics();

    let result = match cli.command {
        Commands::Ask {
            text,
            session,
            stream,
        } => ask::run_ask(&config, &text, &session, stream).await,
        Commands::File {
            path,
            session,
            media_type,
        } => ask::run_file(&config, &path, &session, media_type.as_deref()).await,
        Commands::Status => status::run_status(&config).await.map(|()| true),
        Commands::Models => status::run_models(&config).map(|()| true),
        Commands::Config => status::run_config(&config).map(|()| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the tracing subscriber with the given log level.
///
/// Logs go to stderr so answers on stdout stay pipeable.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("larder={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
