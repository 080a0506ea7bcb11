//! Owner task handlers

use super::{CategoryChosen, ChooseCategoryRequest};
use crate::api::AppState;
use crate::error::{Result, TaskError};
use crate::orchestrator::SubmitRequest;
use crate::types::{Category, JobId, OwnerId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

/// GET /owners/:owner/tasks - The owner's task records keyed by job id
pub async fn list_tasks(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<impl IntoResponse> {
    let tasks = state.orchestrator.list_tasks(OwnerId::from(owner)).await?;
    Ok(Json(tasks))
}

/// POST /owners/:owner/tasks - Submit a magnet locator
pub async fn submit_task(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(request): Json<SubmitRequest>,
) -> Result<impl IntoResponse> {
    let submitted = state
        .orchestrator
        .submit(OwnerId::from(owner), request)
        .await?;
    Ok((StatusCode::CREATED, Json(submitted)))
}

/// POST /owners/:owner/tasks/:job_id/category - Resume a task waiting for its category
pub async fn choose_category(
    State(state): State<AppState>,
    Path((owner, job_id)): Path<(String, String)>,
    Json(request): Json<ChooseCategoryRequest>,
) -> Result<impl IntoResponse> {
    let category = Category::parse(&request.category);
    if !category.is_resolved() {
        return Err(TaskError::InvalidCategory(request.category).into());
    }

    let job_id = state
        .orchestrator
        .choose_category(OwnerId::from(owner), JobId::from(job_id), category)
        .await?;
    Ok(Json(CategoryChosen { job_id }))
}

/// DELETE /owners/:owner/tasks/:job_id - Ask the daemon to remove the job
pub async fn cancel_task(
    State(state): State<AppState>,
    Path((owner, job_id)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    state
        .orchestrator
        .cancel(OwnerId::from(owner), JobId::from(job_id))
        .await?;
    Ok(StatusCode::ACCEPTED)
}
