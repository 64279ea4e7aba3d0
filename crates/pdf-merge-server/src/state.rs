use pdf_merge_jobs::JobStore;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared state handed to every request handler
pub struct AppState {
    pub store: Arc<JobStore>,
    started: Instant,
}

impl AppState {
    pub fn new(store: Arc<JobStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            started: Instant::now(),
        })
    }

    /// Status polling interval recommended to clients
    pub fn poll_interval(&self) -> Duration {
        self.store.config().poll_interval
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
