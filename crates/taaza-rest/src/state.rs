//! Application state for Axum handlers.

use std::sync::Arc;
use taaza_mail::{EmailService, WorkerPool};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub email_service: EmailService,
    pub worker_pool: Option<Arc<WorkerPool>>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(email_service: EmailService) -> Self {
        Self {
            email_service,
            worker_pool: None,
        }
    }

    /// Attach the worker pool so its counters show up in the stats endpoint.
    #[must_use]
    pub fn with_worker_pool(mut self, worker_pool: Arc<WorkerPool>) -> Self {
        self.worker_pool = Some(worker_pool);
        self
    }
}
