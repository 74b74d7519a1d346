use std::sync::Arc;

use crate::services::queue::JobQueue;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
}

impl AppState {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }
}
