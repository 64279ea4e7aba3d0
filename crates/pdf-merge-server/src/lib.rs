//! HTTP front end for the PDF merge job service.
//!
//! Clients upload files into a job, optionally reorder them, start a merge, poll
//! its status and download the result. All state lives in a shared
//! [`JobStore`](pdf_merge_jobs::JobStore).

pub mod error;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ErrorResponse};
pub use routes::api_routes;
pub use state::AppState;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;

/// Room for multipart framing on top of the per-job upload limit
const BODY_LIMIT_SLACK: u64 = 1024 * 1024;

/// Build the application router.
pub fn create_app(state: Arc<AppState>) -> Router {
    let body_limit = state
        .store
        .config()
        .max_upload_bytes
        .saturating_add(BODY_LIMIT_SLACK);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    api_routes(state).layer(DefaultBodyLimit::max(body_limit))
}
