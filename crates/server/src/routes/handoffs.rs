// crates/server/src/routes/handoffs.rs
//! Retrieval endpoint.
//!
//! - GET /handoffs?query=&days_back=&max_results=

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use handoff_core::Handoff;
use handoff_search::query::{DEFAULT_DAYS_BACK, DEFAULT_MAX_RESULTS};
use handoff_search::{query, render_markdown, RetrievalQuery};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

/// Query-string parameters. Numbers stay signed so that `0` and negatives
/// reach validation and come back as 400 instead of a parse rejection.
#[derive(Debug, Default, Deserialize)]
pub struct HandoffsParams {
    pub query: Option<String>,
    pub days_back: Option<i64>,
    pub max_results: Option<i64>,
}

impl HandoffsParams {
    fn into_query(self) -> Result<RetrievalQuery, handoff_search::QueryError> {
        RetrievalQuery::new(
            self.query,
            self.days_back.unwrap_or(i64::from(DEFAULT_DAYS_BACK)),
            self.max_results.unwrap_or(DEFAULT_MAX_RESULTS as i64),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct HandoffsResponse {
    /// Same text the CLI prints for `handoff get`.
    pub markdown: String,
    pub handoffs: Vec<Handoff>,
}

/// GET /api/handoffs
async fn get_handoffs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HandoffsParams>,
) -> ApiResult<Json<HandoffsResponse>> {
    let retrieval = params.into_query()?;
    let handoffs = tokio::task::spawn_blocking(move || {
        query(&state.index, &state.store, &retrieval)
    })
    .await??;

    Ok(Json(HandoffsResponse {
        markdown: render_markdown(&handoffs),
        handoffs,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/handoffs", get(get_handoffs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_when_params_missing() {
        let q = HandoffsParams::default().into_query().unwrap();
        assert_eq!(q.days_back(), DEFAULT_DAYS_BACK);
        assert_eq!(q.max_results(), DEFAULT_MAX_RESULTS);
        assert!(q.text().is_none());
    }

    #[test]
    fn test_zero_values_rejected() {
        let params = HandoffsParams {
            max_results: Some(0),
            ..Default::default()
        };
        assert!(params.into_query().is_err());

        let params = HandoffsParams {
            days_back: Some(-2),
            ..Default::default()
        };
        assert!(params.into_query().is_err());
    }
}
