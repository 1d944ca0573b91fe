// crates/server/src/lib.rs
//! Handoff server library.
//!
//! Axum HTTP surface over the retrieval, extraction and batch pipelines.
//! The `handoff` binary in `main.rs` uses the same [`AppState`] for both the
//! one-shot CLI commands and `handoff serve`.

pub mod error;
pub mod jobs;
pub mod routes;
pub mod state;

pub use error::*;
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
