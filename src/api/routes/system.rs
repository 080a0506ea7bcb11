//! System handlers: health and the active report.

use super::ActiveReport;
use crate::api::AppState;
use crate::error::Result;
use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

/// GET /health - Health check
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "dropped_notifications": state.orchestrator.dropped_notifications(),
    }))
}

/// GET /active - Report of the daemon's active jobs
pub async fn active_report(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let report = state.orchestrator.tell_active(None).await?;
    Ok(Json(ActiveReport { report }))
}
