// crates/server/src/routes/extract.rs
//! Interactive extraction endpoint.
//!
//! - POST /extract `{ "session_id"? }`

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use handoff_core::Handoff;
use handoff_pipeline::ExtractStatus;
use handoff_search::render_markdown;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ExtractRequest {
    /// Full UUID or 8+ character prefix. Omitted means "resolve from the
    /// server's own process and working directory".
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub status: ExtractStatus,
    pub handoff: Handoff,
    pub markdown: String,
}

/// POST /api/extract
async fn extract(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExtractRequest>,
) -> ApiResult<Json<ExtractResponse>> {
    let outcome = state
        .interactive
        .extract(&state.resolver, body.session_id.as_deref())
        .await?;
    let markdown = render_markdown(std::slice::from_ref(&outcome.handoff));
    Ok(Json(ExtractResponse {
        status: outcome.status,
        handoff: outcome.handoff,
        markdown,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/extract", post(extract))
}
