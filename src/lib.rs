//! # aria-pilot
//!
//! Lifecycle orchestrator for torrent downloads driven through an aria2 daemon.
//!
//! A submitted magnet locator goes through three daemon jobs worth of life:
//! the metadata is fetched first, then classified into a content category,
//! then the payload is transferred into that category's directory and seeded
//! until the daemon stops it. Every step is persisted per owner, so a restart
//! resumes watching whatever was in flight.
//!
//! ## Architecture
//!
//! - A **status poller** owns the set of watched jobs and queries the daemon
//!   for all of them in one batch per tick.
//! - A single **lifecycle task** consumes the poller's status events and owner
//!   commands one at a time, and is the only writer of task records.
//! - Owners are told what happens through a bounded-retry **notification
//!   outbox**.
//!
//! ## Quick Start
//!
//! ```no_run
//! use aria_pilot::{Config, Orchestrator, OwnerId, SubmitRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::new(Config::default()).await?;
//!
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     orchestrator
//!         .submit(
//!             OwnerId::from("alice"),
//!             SubmitRequest {
//!                 locator: "magnet:?xt=urn:btih:...".to_string(),
//!                 ..Default::default()
//!             },
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST intake
pub mod api;
/// Content classification gateway
pub mod classifier;
/// Configuration types
pub mod config;
/// aria2 control interface
pub mod daemon;
/// Task record persistence
pub mod db;
/// Error types
pub mod error;
/// Owner notifications
pub mod notify;
/// Lifecycle orchestration
pub mod orchestrator;
/// Daemon status poller
pub mod poller;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Locator parsing and report rendering
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, KeyValueStore, TaskStore};
pub use error::{ApiError, DaemonError, DatabaseError, Error, ErrorDetail, Result, TaskError, ToHttpStatus};
pub use orchestrator::{Components, Orchestrator, SubmitRequest, Submitted};
pub use types::{
    Category, DaemonStatus, Event, JobId, OwnerId, RetireReason, Stage, StatusEvent, TaskId,
    TaskMap, TaskRecord,
};

/// Run until SIGTERM or SIGINT (Ctrl+C elsewhere), then release storage.
///
/// Background tasks are not drained; they end with the runtime.
///
/// # Example
///
/// ```no_run
/// use aria_pilot::{Config, Orchestrator, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = Orchestrator::new(Config::default()).await?;
///     run_with_shutdown(orchestrator).await;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: Orchestrator) {
    wait_for_signal().await;
    tracing::info!("shutting down");
    orchestrator.close().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration can fail in restricted environments
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Could not register both signal handlers, waiting on the other");
            only.recv().await;
            tracing::info!("Received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
