//! aria-pilot daemon
//!
//! Usage: `aria-pilot [config.json]` (default `aria-pilot.json`; built-in
//! defaults when that file does not exist). Log verbosity follows `RUST_LOG`.

use aria_pilot::{Config, Orchestrator, api, run_with_shutdown};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "aria-pilot.json";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let config = if path.exists() {
        match Config::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "cannot load configuration");
                return ExitCode::FAILURE;
            }
        }
    } else {
        tracing::warn!(path = %path.display(), "configuration file not found, using defaults");
        Config::default()
    };

    let orchestrator = match Orchestrator::new(config).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let _api = api::spawn_api_server(&orchestrator);
    run_with_shutdown(orchestrator).await;
    ExitCode::SUCCESS
}
