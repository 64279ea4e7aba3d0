mod health;
mod jobs;

use crate::state::AppState;
use axum::Router;
use std::sync::Arc;

/// All API routes, mounted under `/api`
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new().merge(health::router()).merge(jobs::router()),
        )
        .with_state(state)
}
