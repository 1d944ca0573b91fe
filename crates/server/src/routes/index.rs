// crates/server/src/routes/index.rs
//! - POST /index/rebuild: rebuild the index from the handoff store.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    pub handoff_count: usize,
    pub elapsed_ms: u64,
}

async fn rebuild(State(state): State<Arc<AppState>>) -> ApiResult<Json<RebuildResponse>> {
    let t0 = Instant::now();
    let handoff_count =
        tokio::task::spawn_blocking(move || state.index.rebuild(&state.store)).await??;
    Ok(Json(RebuildResponse {
        handoff_count,
        elapsed_ms: t0.elapsed().as_millis() as u64,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/index/rebuild", post(rebuild))
}
