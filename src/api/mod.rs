//! REST intake
//!
//! Owner commands over HTTP, for messaging front ends that prefer calling in
//! over linking the library. Every route lives under `/api/v1`.

use crate::{Orchestrator, Result};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error_response;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Tasks
/// - `GET /owners/:owner/tasks` - List the owner's task records
/// - `POST /owners/:owner/tasks` - Submit a magnet locator
/// - `POST /owners/:owner/tasks/:job_id/category` - Choose the category of a waiting task
/// - `DELETE /owners/:owner/tasks/:job_id` - Ask the daemon to remove a job
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /active` - Report of the daemon's active jobs
pub fn create_router(orchestrator: Orchestrator) -> Router {
    let api_key = orchestrator.config().api.api_key.clone();
    let state = AppState::new(orchestrator);

    let api = Router::new()
        .route("/health", get(routes::health_check))
        .route("/active", get(routes::active_report))
        .route(
            "/owners/:owner/tasks",
            get(routes::list_tasks).post(routes::submit_task),
        )
        .route(
            "/owners/:owner/tasks/:job_id",
            axum::routing::delete(routes::cancel_task),
        )
        .route(
            "/owners/:owner/tasks/:job_id/category",
            post(routes::choose_category),
        )
        .with_state(state);

    let api = if api_key.is_some() {
        api.layer(middleware::from_fn_with_state(api_key, auth::require_api_key))
    } else {
        api
    };

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on the configured bind address until the server fails.
///
/// # Example
///
/// ```no_run
/// use aria_pilot::{Config, Orchestrator};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let orchestrator = Orchestrator::new(Config::default()).await?;
/// aria_pilot::api::start_api_server(orchestrator).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(orchestrator: Orchestrator) -> Result<()> {
    let bind_address = orchestrator.config().api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(orchestrator);
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

/// Start the API server in the background when it is enabled in the config
pub fn spawn_api_server(
    orchestrator: &Orchestrator,
) -> Option<tokio::task::JoinHandle<Result<()>>> {
    if !orchestrator.config().api.enabled {
        tracing::info!("API server disabled");
        return None;
    }
    let orchestrator = orchestrator.clone();
    Some(tokio::spawn(async move {
        let result = start_api_server(orchestrator).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "API server failed");
        }
        result
    }))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
