//! API route handlers for the handoff server.

pub mod extract;
pub mod handoffs;
pub mod health;
pub mod index;
pub mod jobs;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health - Health check
/// - GET  /api/handoffs - Ranked handoffs for a free-text query
/// - POST /api/extract - Extract one session (interactive provider)
/// - POST /api/index/rebuild - Rebuild the index from the store
/// - POST /api/batch - Start a bulk import job
/// - GET  /api/jobs - Active jobs
/// - GET  /api/jobs/{id} - Job progress and final summary
/// - POST /api/jobs/{id}/cancel - Cancel a running job
pub fn api_routes(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(health::router())
        .merge(handoffs::router())
        .merge(extract::router())
        .merge(index::router())
        .merge(jobs::router());

    Router::new().nest("/api", api).with_state(state)
}
