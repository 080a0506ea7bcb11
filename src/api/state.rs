//! Application state for the API server

use crate::Orchestrator;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request; the orchestrator handle is a set of channel senders.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the running orchestrator
    pub orchestrator: Orchestrator,
}

impl AppState {
    /// Create a new AppState
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}
