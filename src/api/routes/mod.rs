//! Route handlers for the REST API
//!
//! - [`tasks`] - owner task commands
//! - [`system`] - health and the active report

use serde::{Deserialize, Serialize};

mod system;
mod tasks;

pub use system::*;
pub use tasks::*;

/// Request body for POST /owners/:owner/tasks/:job_id/category
#[derive(Debug, Deserialize, Serialize)]
pub struct ChooseCategoryRequest {
    /// Category name or alias
    pub category: String,
}

/// Response body for POST /owners/:owner/tasks/:job_id/category
#[derive(Debug, Deserialize, Serialize)]
pub struct CategoryChosen {
    /// Job id of the started bulk transfer
    pub job_id: crate::types::JobId,
}

/// Response body for GET /active
#[derive(Debug, Deserialize, Serialize)]
pub struct ActiveReport {
    /// Rendered report, one entry per active daemon job
    pub report: String,
}
